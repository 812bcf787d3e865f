/// Asserts that the traits support dynamic dispatch.
///
/// From <https://docs.rs/static_assertions/1.1.0/src/static_assertions/assert_obj_safe.rs.html#72-76>
#[macro_export]
macro_rules! assert_obj_safe {
    ($($xs:path),+ $(,)?) => {
        $(const _: Option<&dyn $xs> = None;)+
    };
}

/// Returns an error when the buffer does not hold at least `size` bytes.
///
/// The error type is inferred from the enclosing function's return type via
/// the [`NotEnoughBytesErr`](crate::NotEnoughBytesErr) constructor trait, so
/// the same macro works in both encoders and decoders.
#[macro_export]
macro_rules! ensure_size {
    (ctx: $ctx:expr, in: $buf:ident, size: $expected:expr) => {{
        let received = $buf.len();
        let expected = $expected;
        if !(received >= expected) {
            return Err($crate::not_enough_bytes_err($ctx, received, expected));
        }
    }};
    (in: $buf:ident, size: $expected:expr) => {{
        $crate::ensure_size!(ctx: Self::NAME, in: $buf, size: $expected)
    }};
}

/// Shorthand for `ensure_size!` against `Self::FIXED_PART_SIZE`.
#[macro_export]
macro_rules! ensure_fixed_part_size {
    (in: $buf:ident) => {{
        $crate::ensure_size!(ctx: Self::NAME, in: $buf, size: Self::FIXED_PART_SIZE)
    }};
}

/// Fallible integer narrowing reported as an "invalid field" error.
#[macro_export]
macro_rules! cast_length {
    (ctx: $ctx:expr, $field:expr, $len:expr) => {{
        ::core::convert::TryInto::try_into($len)
            .map_err(|_| $crate::invalid_field_err($ctx, $field, "value does not fit the field width"))
    }};
    ($field:expr, $len:expr) => {{
        $crate::cast_length!(ctx: Self::NAME, $field, $len)
    }};
}
