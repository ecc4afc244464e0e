pub(crate) mod common;
pub(crate) mod inspect;
pub(crate) mod upgrade;
