pub mod prelude;

pub mod approvals;
pub mod departments;
pub mod login_codes;
pub mod profiles;
pub mod resources;
pub mod semesters;
pub mod sessions;
pub mod subjects;
