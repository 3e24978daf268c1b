/// Where user-visible messages go. Every failure an operation swallows is
/// handed to one of these.
pub trait Notifier: Send + Sync {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}
