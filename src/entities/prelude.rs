pub use super::approvals::Entity as Approvals;
pub use super::departments::Entity as Departments;
pub use super::login_codes::Entity as LoginCodes;
pub use super::profiles::Entity as Profiles;
pub use super::resources::Entity as Resources;
pub use super::semesters::Entity as Semesters;
pub use super::sessions::Entity as Sessions;
pub use super::subjects::Entity as Subjects;
