pub mod backup;
pub mod core;
pub mod faculties;
pub mod grade_draft;
pub mod grades;
pub mod sessions;
