pub mod checks;
pub mod health;
pub mod roles;
pub mod rules;
