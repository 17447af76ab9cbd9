use super::SubscriberEmail;

/// One record to be subscribed to a new list. Identity is the email address;
/// duplicates are left to the marketing service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscriber {
    pub email: SubscriberEmail,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
}

impl Subscriber {
    /// A subscriber with no merge field values
    pub fn new(email: SubscriberEmail) -> Self {
        Self {
            email,
            first_name: None,
            last_name: None,
            gender: None,
        }
    }
}
