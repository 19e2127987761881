pub mod password;
pub mod validation;

pub use password::{
    hash_password, verify_against_placeholder, verify_password, Password, PasswordHashString,
};
pub use validation::ValidatedJson;
