pub mod layout;
pub mod script;
