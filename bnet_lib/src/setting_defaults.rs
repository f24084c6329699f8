/// The `Default` impl for `bool` is `false`.
/// This function covers the `true` case.
pub(crate) fn default_true() -> bool {
    true
}

pub(crate) fn default_address() -> String {
    "127.0.0.1".to_string()
}

pub(crate) fn default_name() -> String {
    crate::session::DEFAULT_CONSOLE_NAME.to_string()
}

pub(crate) fn default_header_timeout() -> u64 {
    10
}
