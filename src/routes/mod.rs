pub mod clients;
pub mod events;
pub mod health;
pub mod objects;
pub mod scripts;
pub mod shutdown;
