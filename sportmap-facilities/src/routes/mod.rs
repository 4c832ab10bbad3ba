pub mod facilities;
pub mod health;
