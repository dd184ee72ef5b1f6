pub(crate) mod file_intake;
pub(crate) mod notifications;
pub(crate) mod notifier;
pub(crate) mod storage;
