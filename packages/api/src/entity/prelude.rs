pub use super::contact_message::Entity as ContactMessage;
pub use super::grading::Entity as Grading;
pub use super::purchase::Entity as Purchase;
pub use super::user::Entity as User;
