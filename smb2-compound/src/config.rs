//! Per-share configuration

/// Per-share behaviour of path operations
#[derive(Debug, Clone)]
pub struct ShareConfig {
    /// open every target with backup intent
    pub(crate) backup_intent: bool,
    /// allow queries of the share root through the cached root handle
    pub(crate) root_handle_cache: bool,
    /// encrypt every exchange, even if the session does not require it
    pub(crate) encrypt: bool,
    /// remap characters reserved by Windows into the private use area
    pub(crate) map_reserved_chars: bool,
    /// local path separator
    pub(crate) dir_sep: char,
}

impl Default for ShareConfig {
    #[inline]
    fn default() -> Self {
        Self {
            backup_intent: false,
            root_handle_cache: true,
            encrypt: false,
            map_reserved_chars: false,
            dir_sep: '/',
        }
    }
}

macro_rules! setters {
    ($($f:ident: $t:ty,)+) => {$(
        #[inline]
        pub fn $f(&mut self, $f: $t) -> &mut Self {
            self.$f = $f;
            self
        }
    )+};
}

macro_rules! getters {
    ($($f:ident => $g:ident: $t:ty,)+) => {$(
        #[must_use]
        #[inline]
        pub const fn $g(&self) -> $t {
            self.$f
        }
    )+};
}

impl ShareConfig {
    setters!(
        backup_intent: bool,
        root_handle_cache: bool,
        encrypt: bool,
        map_reserved_chars: bool,
        dir_sep: char,
    );

    getters!(
        backup_intent => uses_backup_intent: bool,
        root_handle_cache => uses_root_handle_cache: bool,
        encrypt => forces_encryption: bool,
        map_reserved_chars => maps_reserved_chars: bool,
        dir_sep => separator: char,
    );
}
