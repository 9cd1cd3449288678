//! Request log status constants

macro_rules! status_codes {
    ($($name:ident  $value:literal),* $(,)?) => {
        $(
            pub const $name: u16 = $value;
        )*
    }
}

status_codes! {
    OK                          200,
    BAD_REQUEST                 400,
    FORBIDDEN                   403,
    FILE_NOT_FOUND              404,
    INTERNAL_SERVER_ERROR       500,
}
