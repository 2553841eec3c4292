use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::phone::NormalizedPhone;

/// The only currency the checkout takes.
pub const CURRENCY: &str = "KES";
/// Billing country sent with every order.
pub const COUNTRY_CODE: &str = "KE";

/// How the customer intends to pay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentMethod {
    /// STK push to the customer's phone.
    Mpesa,
    /// Any method offered on the PesaPal hosted page.
    Card,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mpesa => "MPESA",
            Self::Card => "CARD",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "MPESA" | "M-PESA" => Some(Self::Mpesa),
            "CARD" | "REDIRECT" => Some(Self::Card),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Who is paying.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub email: String,
    /// Raw phone number as typed; validated before use.
    pub phone: String,
    /// Display name, split on the first space into first/last name.
    pub name: String,
}

/// A payment as collected from the form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub amount: Decimal,
    pub description: String,
    pub customer: Customer,
    pub method: PaymentMethod,
}

/// Billing sub-record of an order, in the field layout PesaPal expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingAddress {
    pub email_address: String,
    pub phone_number: String,
    pub country_code: String,
    pub first_name: String,
    pub middle_name: String,
    pub last_name: String,
    pub line_1: String,
    pub line_2: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub zip_code: String,
}

impl BillingAddress {
    pub const DEFAULT_LINE_1: &'static str = "N/A";
    pub const DEFAULT_CITY: &'static str = "Nairobi";

    /// Billing record for a customer known only by email, phone and display name.
    pub fn for_customer(email: &str, phone: &NormalizedPhone, display_name: &str) -> Self {
        let (first_name, last_name) = split_name(display_name);
        Self {
            email_address: email.trim().to_string(),
            phone_number: phone.as_str().to_string(),
            country_code: COUNTRY_CODE.to_string(),
            first_name,
            middle_name: String::new(),
            last_name,
            line_1: Self::DEFAULT_LINE_1.to_string(),
            line_2: String::new(),
            city: Self::DEFAULT_CITY.to_string(),
            state: String::new(),
            postal_code: String::new(),
            zip_code: String::new(),
        }
    }
}

/// Splits "Jane Wanjiru Doe" into ("Jane", "Wanjiru Doe").
pub fn split_name(display_name: &str) -> (String, String) {
    let mut parts = display_name.split_whitespace();
    let first = parts.next().unwrap_or_default().to_string();
    let rest = parts.collect::<Vec<_>>().join(" ");
    (first, rest)
}

/// Order as submitted by a browser to `POST /api/submit-order`.
///
/// Everything except amount is optional here; missing billing fields get the
/// same defaults the checkout form would have sent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderData {
    #[serde(default)]
    pub id: Option<String>,
    pub amount: Decimal,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub callback_url: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub billing_address: BillingAddressInput,
}

impl OrderData {
    /// True when the browser asked for an STK push and gave a number for it.
    pub fn wants_mobile_money(&self) -> bool {
        let is_mpesa = self
            .payment_method
            .as_deref()
            .and_then(PaymentMethod::from_str)
            == Some(PaymentMethod::Mpesa);
        let has_phone = self
            .phone_number
            .as_deref()
            .is_some_and(|p| !p.trim().is_empty());
        is_mpesa && has_phone
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BillingAddressInput {
    #[serde(default)]
    pub email_address: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub middle_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub line_1: Option<String>,
    #[serde(default)]
    pub line_2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub zip_code: Option<String>,
}

fn non_empty_or(value: Option<String>, default: &str) -> String {
    value
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

impl BillingAddressInput {
    /// Fills the gaps. The country is always Kenya.
    pub fn into_billing_address(self) -> BillingAddress {
        BillingAddress {
            email_address: self.email_address.unwrap_or_default(),
            phone_number: self.phone_number.unwrap_or_default(),
            country_code: COUNTRY_CODE.to_string(),
            first_name: self.first_name.unwrap_or_default(),
            middle_name: self.middle_name.unwrap_or_default(),
            last_name: self.last_name.unwrap_or_default(),
            line_1: non_empty_or(self.line_1, BillingAddress::DEFAULT_LINE_1),
            line_2: self.line_2.unwrap_or_default(),
            city: non_empty_or(self.city, BillingAddress::DEFAULT_CITY),
            state: self.state.unwrap_or_default(),
            postal_code: self.postal_code.unwrap_or_default(),
            zip_code: self.zip_code.unwrap_or_default(),
        }
    }
}

/// An order that is ready to go out, minus the notification id that only
/// exists once the IPN URL is registered.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub id: String,
    pub amount: Decimal,
    pub description: String,
    pub callback_url: String,
    pub billing_address: BillingAddress,
    pub branch: Option<String>,
    /// Set when the order should be followed by an STK push.
    pub push_to: Option<NormalizedPhone>,
}

impl OrderDraft {
    pub fn into_envelope(self, notification_id: String) -> OrderEnvelope {
        OrderEnvelope {
            id: self.id,
            currency: CURRENCY.to_string(),
            amount: self.amount,
            description: self.description,
            callback_url: self.callback_url,
            notification_id,
            billing_address: self.billing_address,
            branch: self.branch,
        }
    }
}

/// Body of `SubmitOrderRequest`. Built once per attempt and sent as is.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderEnvelope {
    pub id: String,
    pub currency: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub description: String,
    pub callback_url: String,
    pub notification_id: String,
    pub billing_address: BillingAddress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_split_name() {
        assert_eq!(split_name("Jane Doe"), ("Jane".into(), "Doe".into()));
        assert_eq!(
            split_name("  Jane  Wanjiru Doe "),
            ("Jane".into(), "Wanjiru Doe".into())
        );
        assert_eq!(split_name("Jane"), ("Jane".into(), String::new()));
        assert_eq!(split_name(""), (String::new(), String::new()));
    }

    #[test]
    fn test_payment_method_from_str() {
        assert_eq!(PaymentMethod::from_str("MPESA"), Some(PaymentMethod::Mpesa));
        assert_eq!(PaymentMethod::from_str("mpesa"), Some(PaymentMethod::Mpesa));
        assert_eq!(PaymentMethod::from_str("card"), Some(PaymentMethod::Card));
        assert_eq!(PaymentMethod::from_str("bitcoin"), None);
    }

    #[test]
    fn test_wants_mobile_money_needs_method_and_phone() {
        let mut data = OrderData {
            payment_method: Some("MPESA".into()),
            phone_number: Some("0712345678".into()),
            ..Default::default()
        };
        assert!(data.wants_mobile_money());

        data.phone_number = Some("  ".into());
        assert!(!data.wants_mobile_money());

        data.phone_number = Some("0712345678".into());
        data.payment_method = Some("CARD".into());
        assert!(!data.wants_mobile_money());
    }

    #[test]
    fn test_billing_defaults() {
        let address = BillingAddressInput {
            first_name: Some("Jane".into()),
            city: Some("".into()),
            ..Default::default()
        }
        .into_billing_address();

        assert_eq!(address.country_code, "KE");
        assert_eq!(address.line_1, "N/A");
        assert_eq!(address.city, "Nairobi");
        assert_eq!(address.first_name, "Jane");
        assert_eq!(address.zip_code, "");
    }

    #[test]
    fn test_envelope_serializes_amount_as_number() {
        let phone = NormalizedPhone::parse("0712345678").unwrap();
        let draft = OrderDraft {
            id: "order_1".into(),
            amount: dec!(1500.50),
            description: "Visa application".into(),
            callback_url: "https://example.com/api/ipn".into(),
            billing_address: BillingAddress::for_customer("a@b.co", &phone, "Jane Doe"),
            branch: None,
            push_to: Some(phone),
        };

        let json = serde_json::to_value(draft.into_envelope("ipn-1".into())).unwrap();
        assert_eq!(json["amount"], serde_json::json!(1500.5));
        assert_eq!(json["currency"], "KES");
        assert_eq!(json["notification_id"], "ipn-1");
        assert_eq!(json["billing_address"]["phone_number"], "+254712345678");
        assert_eq!(json["billing_address"]["last_name"], "Doe");
        assert!(json.get("branch").is_none());
    }
}
