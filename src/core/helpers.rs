/// Define an enumeration backed by an integer type
///
/// The generated enumeration can be converted into the integer type, be
/// compared with the integer type and be created from the integer type using
/// `ConvertFrom`.
macro_rules! extended_enum {
    ( $name:ident, $ty:ty, $( $var:ident => $val:expr ),+ $(,)* ) => (
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        pub enum $name {
            $($var,)*
        }

        impl From<$name> for $ty {
            fn from(v: $name) -> Self {
                match v {
                    $( $name::$var => $val, )*
                }
            }
        }

        impl crate::core::ConvertFrom<$ty> for $name {
            fn convert_from(v: $ty) -> Option<Self> {
                $( if v == $val { return Some($name::$var); } )*
                None
            }
        }

        impl PartialEq<$name> for $ty {
            fn eq(&self, other: &$name) -> bool {
                *self == <$ty>::from(*other)
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
                write!(f, "{:?}", self)
            }
        }
    );
}
