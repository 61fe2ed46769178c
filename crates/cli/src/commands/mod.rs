pub mod inspect;
pub mod messaging;
pub mod translate;
