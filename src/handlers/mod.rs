pub(crate) mod health;
pub(crate) mod notifications;
pub(crate) mod payments;
pub(crate) mod upload;
