pub mod extract;
pub mod handlers;
pub mod nonce;
pub mod password;
pub mod tokens;
pub mod wallet;
