//! Payment gateway clients

pub mod paypal;
pub mod razorpay;
