pub(crate) mod assignments;
pub(crate) mod errors;
pub(crate) mod guards;
pub(crate) mod handlers;
pub(crate) mod router;
pub(crate) mod students;
pub(crate) mod submissions;
pub(crate) mod videos;
