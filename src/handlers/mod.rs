pub mod commit;
pub mod health;
