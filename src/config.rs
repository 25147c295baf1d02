//! Tunable constants (spec §10.3). `Config::default()` reproduces the
//! hard-coded constants from the C original exactly; every field here names
//! a constant the spec already fixes, so overriding one does not add
//! functionality, only changes a deployment profile.

/// Parameters governing the socket engine and the components it owns.
#[derive(Clone, Debug)]
pub struct Config {
    /// How many objects the object pool keeps around after a `cull` at the
    /// end of every public entry (spec §4.1, §4.8 step 6/8).
    pub pool_keep: u32,

    /// Lifetime, in seconds, of strike-register tokens (spec §4.6). Sockets
    /// use 60.
    pub register_lifetime: u32,

    /// Minimum and maximum size (power-of-two entry count) of the connection
    /// hash's underlying tables (spec §4.4).
    pub dict_min_size: u32,
    pub dict_max_size: u32,

    /// Minimum and maximum size (power-of-two entry count) of the timer
    /// heap's backing array (spec §4.5).
    pub heap_min_size: u32,
    pub heap_max_size: u32,

    /// Minimum and maximum size (power-of-two 32-bit-word count) of the
    /// strike register's circular bitset (spec §4.6).
    pub register_min_bits: u32,
    pub register_max_bits: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            pool_keep: 8,
            register_lifetime: 60,
            dict_min_size: 1 << 6,
            dict_max_size: 1 << 28,
            heap_min_size: 1 << 6,
            heap_max_size: 1 << 28,
            register_min_bits: 1 << 5,
            register_max_bits: 1 << 29,
        }
    }
}
