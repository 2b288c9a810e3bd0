//! `define_port_error!`: declares a port error enum with snake_case
//! constructors taking `impl Into<_>` field values.

macro_rules! define_port_error {
    (@ctor $variant:ident) => {
        ::paste::paste! {
            pub fn [<$variant:snake>]() -> Self {
                Self::$variant
            }
        }
    };

    (@ctor $variant:ident { $($field:ident : $ty:ty),* $(,)? }) => {
        define_port_error!(@ctor_impl $variant () () $( $field : $ty, )*);
    };

    (@ctor_impl $variant:ident ($($params:tt)*) ($($inits:tt)*) ) => {
        ::paste::paste! {
            pub fn [<$variant:snake>]($($params)*) -> Self {
                Self::$variant { $($inits)* }
            }
        }
    };

    (@ctor_impl $variant:ident ($($params:tt)*) ($($inits:tt)*) $field:ident : $ty:ty, $($rest:tt)*) => {
        define_port_error!(
            @ctor_impl
            $variant
            ($($params)* $field: impl Into<$ty>,)
            ($($inits)* $field: $field.into(),)
            $($rest)*
        );
    };
    (
        $(#[$outer:meta])*
        pub enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident $( { $($field:ident : $ty:ty),* $(,)? } )? => $message:expr
            ),* $(,)?
        }
    ) => {
        $(#[$outer])*
        #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
        pub enum $name {
            $(
                $(#[$variant_meta])*
                #[error($message)]
                $variant $( { $($field : $ty),* } )?,
            )*
        }

        impl $name {
            $(
                define_port_error!(@ctor $variant $( { $($field : $ty),* } )?);
            )*
        }
    };
}

pub(crate) use define_port_error;

#[cfg(test)]
mod tests {
    use rstest::rstest;

    define_port_error! {
        pub enum SampleError {
            Unreachable { message: String } => "unreachable: {message}",
            Throttled { retry_secs: u64 } => "throttled for {retry_secs}s",
            Rejected { reason: String, status: u16 } => "rejected ({status}): {reason}",
            Closed => "closed",
        }
    }

    #[rstest]
    #[case(SampleError::unreachable("db-1"), "unreachable: db-1")]
    #[case(SampleError::throttled(5_u64), "throttled for 5s")]
    #[case(SampleError::rejected("bad row", 422_u16), "rejected (422): bad row")]
    #[case(SampleError::closed(), "closed")]
    fn constructors_render_messages(#[case] err: SampleError, #[case] expected: &str) {
        assert_eq!(err.to_string(), expected);
    }

    #[rstest]
    fn string_fields_accept_owned_and_borrowed_values() {
        assert_eq!(
            SampleError::unreachable(String::from("db-1")),
            SampleError::unreachable("db-1")
        );
    }
}
