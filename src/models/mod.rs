/// Données qui traversent la chaîne surveillance → score → notification
pub mod alert;
pub mod email;
pub mod raw;
pub mod rule;

pub use alert::{Alert, AlertLevel};
pub use email::{Attachment, Email, HeaderMap};
pub use raw::{Envelope, RawMessage};
pub use rule::{Action, Condition, ConditionKind, Operator, Rule};
