use rand::Rng;

use crate::models::DeliveryMethod;

/// Verification code pair: exactly one side is populated, matching the
/// delivery method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCode {
    pub pickup_code: Option<String>,
    pub delivery_code: Option<String>,
}

/// Issues short, staff-facing verification codes. Codes are for visual
/// matching at handover, not a security boundary or lookup key, so collisions
/// between generated codes are tolerated.
#[derive(Debug, Clone)]
pub struct CodeIssuer {
    prefix: String,
}

impl CodeIssuer {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// A caller-supplied code is used verbatim; otherwise a
    /// `<PREFIX>-<P|D>-<4 digits>` code is synthesized.
    pub fn issue(&self, method: DeliveryMethod, supplied: Option<&str>) -> IssuedCode {
        let code = match supplied {
            Some(code) => code.to_string(),
            None => self.generate(method),
        };

        match method {
            DeliveryMethod::Pickup => IssuedCode {
                pickup_code: Some(code),
                delivery_code: None,
            },
            DeliveryMethod::Delivery => IssuedCode {
                pickup_code: None,
                delivery_code: Some(code),
            },
        }
    }

    fn generate(&self, method: DeliveryMethod) -> String {
        let tag = match method {
            DeliveryMethod::Pickup => "P",
            DeliveryMethod::Delivery => "D",
        };
        let digits: u16 = rand::thread_rng().gen_range(0..10_000);
        format!("{}-{}-{:04}", self.prefix, tag, digits)
    }
}
