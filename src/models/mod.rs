pub(crate) mod notification;
pub(crate) mod payment;
