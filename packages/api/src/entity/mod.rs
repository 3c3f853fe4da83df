//! `SeaORM` entities for the CorestoneGrader schema

pub mod prelude;

pub mod contact_message;
pub mod grading;
pub mod purchase;
pub mod user;
