use chrono::Datelike;
use chrono::NaiveDate;

/// Name of a newly created mailing list. Always trimmed and non-empty; any
/// other limits are left to the service.
///
/// Must be instantiated with `ListName::parse` or `ListName::for_date`; the
/// field is private so that neither can be bypassed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListName(String);

impl ListName {
    pub fn parse(name: String) -> Result<Self, String> {
        let name = name.trim();
        if name.is_empty() {
            return Err("The list name must not be empty".to_string());
        }
        Ok(Self(name.to_string()))
    }

    /// `List YYYY.MM.DD`, used when the caller did not name the list
    pub fn for_date(date: NaiveDate) -> Self {
        Self(format!(
            "List {:04}.{:02}.{:02}",
            date.year(),
            date.month(),
            date.day()
        ))
    }

    /// Parse `name` if given, otherwise generate one from today's (local) date
    pub fn or_today(name: Option<String>) -> Result<Self, String> {
        match name {
            Some(name) => Self::parse(name),
            None => Ok(Self::for_date(chrono::Local::now().date_naive())),
        }
    }
}

impl AsRef<str> for ListName {
    fn as_ref(&self) -> &str { &self.0 }
}

impl std::fmt::Display for ListName {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
