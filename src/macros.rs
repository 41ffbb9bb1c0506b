//! Public macros for constructing option structs without relying on struct literal syntax.
//!
//! These keep call sites short and let the option structs grow new fields
//! without breaking existing code.

/// Construct [`crate::Options`] from `Default` and a list of field assignments.
///
/// Example:
///
/// ```rust
/// let options = metawidget_config::options! {
///     with_snippet: false,
///     max_input_bytes: Some(4096),
/// };
/// assert!(!options.with_snippet);
/// ```
#[macro_export]
macro_rules! options {
    ( $( $field:ident : $value:expr ),* $(,)? ) => {{
        let mut opt = $crate::Options::default();
        $(
            {
                opt.$field = $value;
            }
        )*
        opt
    }};
}

/// Construct [`crate::Budget`] from `Default` and a list of field assignments.
///
/// Example:
///
/// ```rust
/// let budget = metawidget_config::budget! {
///     max_elements: 1_000,
///     max_depth: 32,
/// };
/// assert_eq!(budget.max_depth, 32);
/// ```
#[macro_export]
macro_rules! budget {
    ( $( $field:ident : $value:expr ),* $(,)? ) => {{
        let mut b = $crate::Budget::default();
        $(
            {
                b.$field = $value;
            }
        )*
        b
    }};
}
