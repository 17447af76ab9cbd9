mod api_key;
mod list_name;
mod subscriber;
mod subscriber_email;
// allow external `use` statements to skip `list_name` etc
pub use api_key::ApiKey;
pub use list_name::ListName;
pub use subscriber::Subscriber;
pub use subscriber_email::SubscriberEmail;
