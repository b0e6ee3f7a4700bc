pub mod conversations;
pub mod generate;
