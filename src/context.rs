use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Marketplace side a participant acts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Vendor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Vendor => "vendor",
        }
    }

    pub fn from_str(raw: &str) -> Option<Self> {
        match raw {
            "customer" => Some(Role::Customer),
            "vendor" => Some(Role::Vendor),
            _ => None,
        }
    }
}

/// Display identity for one side of a conversation. Account handling lives
/// elsewhere; chat only needs the id, a name to show, and the role tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// A vendor's priced offer on a customer's service request. Payment and
/// wallet movements belong to the quotation subsystem; chat carries the
/// amount as inert data for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quotation {
    pub id: String,
    pub customer_id: String,
    pub vendor_id: String,
    pub title: String,
    pub amount: f64,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// A customer's inquiry against a vendor's advertisement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdRequest {
    pub id: String,
    pub advertisement_id: String,
    pub customer_id: String,
    pub vendor_id: String,
    pub subject: String,
    pub created_at: DateTime<Utc>,
}

/// An accepted vendor-to-vendor link. At most one per unordered pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: String,
    pub vendor_a: String,
    pub vendor_b: String,
    pub created_at: DateTime<Utc>,
}

impl Quotation {
    pub fn other_party(&self, participant_id: &str) -> Option<&str> {
        other_of(&self.customer_id, &self.vendor_id, participant_id)
    }
}

impl AdRequest {
    pub fn other_party(&self, participant_id: &str) -> Option<&str> {
        other_of(&self.customer_id, &self.vendor_id, participant_id)
    }
}

impl Connection {
    pub fn other_party(&self, participant_id: &str) -> Option<&str> {
        other_of(&self.vendor_a, &self.vendor_b, participant_id)
    }
}

fn other_of<'a>(left: &'a str, right: &'a str, who: &str) -> Option<&'a str> {
    if who == left {
        Some(right)
    } else if who == right {
        Some(left)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn other_party_requires_membership() {
        let quotation = Quotation {
            id: "q1".into(),
            customer_id: "c1".into(),
            vendor_id: "v1".into(),
            title: "Kitchen remodel".into(),
            amount: 1200.0,
            status: "sent".into(),
            created_at: Utc::now(),
        };
        assert_eq!(quotation.other_party("c1"), Some("v1"));
        assert_eq!(quotation.other_party("v1"), Some("c1"));
        assert_eq!(quotation.other_party("x"), None);
    }
}
