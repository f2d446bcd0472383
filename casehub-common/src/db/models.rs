//! Shared row models

use serde::{Deserialize, Serialize};

/// A registered account. `password_hash` never leaves the backend.
#[derive(Debug, Clone)]
pub struct User {
    pub guid: String,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub mobile_number: String,
    pub designation: Option<String>,
    pub role: String,
    pub created_at: i64,
}

/// Public projection of a user for API responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub guid: String,
    pub email: String,
    pub name: String,
    pub mobile_number: String,
    pub designation: Option<String>,
    pub role: String,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            guid: user.guid.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            mobile_number: user.mobile_number.clone(),
            designation: user.designation.clone(),
            role: user.role.clone(),
        }
    }
}

/// Subscription package (pricing tier)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    pub guid: String,
    pub package_name: String,
    pub amount: i64,
    pub duration_days: i64,
    pub duration_unit: String,
    pub created_at: i64,
}

/// An active or expired subscription
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub guid: String,
    pub subscriber_name: String,
    pub subscriber_id: String,
    pub package_name: String,
    pub package_id: String,
    pub status: String,
    pub subscription_date: i64,
    pub expiry_date: i64,
    pub payment_id: Option<String>,
    pub transaction_id: Option<String>,
    pub payment_gateway: String,
}
