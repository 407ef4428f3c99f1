// Payment method -> charge strategy dispatch

use crate::model::Money;
use parking_lot::RwLock;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    CreditCard,
    DebitCard,
    Upi,
    NetBanking,
    Wallet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub method: PaymentMethod,
    pub amount: Money,
    #[serde(default)]
    pub card_number: Option<String>,
    #[serde(default)]
    pub card_holder: Option<String>,
    #[serde(default)]
    pub upi_id: Option<String>,
    #[serde(default)]
    pub bank_code: Option<String>,
    #[serde(default)]
    pub wallet_type: Option<String>,
}

impl PaymentRequest {
    pub fn new(method: PaymentMethod, amount: Money) -> Self {
        Self {
            method,
            amount,
            card_number: None,
            card_holder: None,
            upi_id: None,
            bank_code: None,
            wallet_type: None,
        }
    }

    pub fn card(method: PaymentMethod, amount: Money, card_number: &str, card_holder: &str) -> Self {
        Self {
            card_number: Some(card_number.to_string()),
            card_holder: Some(card_holder.to_string()),
            ..Self::new(method, amount)
        }
    }

    pub fn upi(amount: Money, upi_id: &str) -> Self {
        Self {
            upi_id: Some(upi_id.to_string()),
            ..Self::new(PaymentMethod::Upi, amount)
        }
    }

    pub fn net_banking(amount: Money, bank_code: &str) -> Self {
        Self {
            bank_code: Some(bank_code.to_string()),
            ..Self::new(PaymentMethod::NetBanking, amount)
        }
    }

    pub fn wallet(amount: Money, wallet_type: &str) -> Self {
        Self {
            wallet_type: Some(wallet_type.to_string()),
            ..Self::new(PaymentMethod::Wallet, amount)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeResult {
    pub success: bool,
    pub transaction_id: Option<String>,
    pub message: String,
    pub gateway: String,
}

impl ChargeResult {
    pub fn approved(prefix: &str, message: &str, gateway: &str) -> Self {
        Self {
            success: true,
            transaction_id: Some(transaction_id(prefix)),
            message: message.to_string(),
            gateway: gateway.to_string(),
        }
    }

    pub fn declined(message: impl Into<String>, gateway: &str) -> Self {
        Self {
            success: false,
            transaction_id: None,
            message: message.into(),
            gateway: gateway.to_string(),
        }
    }
}

pub type ChargeStrategy = Arc<dyn Fn(&PaymentRequest) -> ChargeResult + Send + Sync>;

fn transaction_id(prefix: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{}{}", prefix, id[..8].to_uppercase())
}

fn mask(card_number: &str) -> String {
    let digits: Vec<char> = card_number.chars().collect();
    if digits.len() < 4 {
        return "****".to_string();
    }
    let last_four: String = digits[digits.len() - 4..].iter().collect();
    format!("****{}", last_four)
}

fn valid_card_number(card_number: &str) -> bool {
    (13..=19).contains(&card_number.len()) && card_number.chars().all(|c| c.is_ascii_digit())
}

// user@bank, each side made of word characters, dots or dashes
fn valid_upi_id(upi_id: &str) -> bool {
    let part_ok = |part: &str| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '.' || c == '-')
    };
    match upi_id.split_once('@') {
        Some((user, bank)) => part_ok(user) && part_ok(bank),
        None => false,
    }
}

fn has_text(value: &Option<String>) -> bool {
    value.as_deref().map_or(false, |v| !v.trim().is_empty())
}

fn approve(approval_rate: f64) -> bool {
    rand::thread_rng().gen::<f64>() < approval_rate
}

pub fn card_strategy(approval_rate: f64) -> ChargeStrategy {
    Arc::new(move |request: &PaymentRequest| {
        const GATEWAY: &str = "Razorpay";
        let Some(card_number) = request.card_number.as_deref().filter(|n| valid_card_number(n)) else {
            return ChargeResult::declined("Invalid card details", GATEWAY);
        };
        info!(card = %mask(card_number), amount = %request.amount, "Processing card payment");

        if approve(approval_rate) {
            ChargeResult::approved("TXN_", "Card payment successful", GATEWAY)
        } else {
            ChargeResult::declined("Card payment declined by issuing bank", GATEWAY)
        }
    })
}

pub fn upi_strategy(approval_rate: f64) -> ChargeStrategy {
    Arc::new(move |request: &PaymentRequest| {
        const GATEWAY: &str = "Razorpay";
        let Some(upi_id) = request.upi_id.as_deref().filter(|id| valid_upi_id(id)) else {
            return ChargeResult::declined("Invalid UPI ID", GATEWAY);
        };
        info!(upi_id, amount = %request.amount, "Processing UPI payment");

        if approve(approval_rate) {
            ChargeResult::approved("UPI_", "UPI payment successful", GATEWAY)
        } else {
            ChargeResult::declined("UPI payment failed - User declined", GATEWAY)
        }
    })
}

pub fn net_banking_strategy(approval_rate: f64) -> ChargeStrategy {
    Arc::new(move |request: &PaymentRequest| {
        const GATEWAY: &str = "PayU";
        if !has_text(&request.bank_code) {
            return ChargeResult::declined("Bank code is required", GATEWAY);
        }
        info!(bank = ?request.bank_code, amount = %request.amount, "Processing net banking payment");

        if approve(approval_rate) {
            ChargeResult::approved("NB_", "Net banking payment successful", GATEWAY)
        } else {
            ChargeResult::declined("Net banking payment failed", GATEWAY)
        }
    })
}

pub fn wallet_strategy(approval_rate: f64) -> ChargeStrategy {
    Arc::new(move |request: &PaymentRequest| {
        const GATEWAY: &str = "Paytm";
        if !has_text(&request.wallet_type) {
            return ChargeResult::declined("Wallet type is required", GATEWAY);
        }
        info!(wallet = ?request.wallet_type, amount = %request.amount, "Processing wallet payment");

        if approve(approval_rate) {
            ChargeResult::approved("WALLET_", "Wallet payment successful", GATEWAY)
        } else {
            ChargeResult::declined("Insufficient wallet balance", GATEWAY)
        }
    })
}

#[derive(Default)]
pub struct PaymentDispatcher {
    strategies: RwLock<HashMap<PaymentMethod, ChargeStrategy>>,
}

impl PaymentDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in strategies for every method, approving valid requests at `approval_rate` (0.0 to 1.0).
    pub fn simulated(approval_rate: f64) -> Self {
        let dispatcher = Self::new();
        let card = card_strategy(approval_rate);
        dispatcher.register(PaymentMethod::CreditCard, Arc::clone(&card));
        dispatcher.register(PaymentMethod::DebitCard, card);
        dispatcher.register(PaymentMethod::Upi, upi_strategy(approval_rate));
        dispatcher.register(PaymentMethod::NetBanking, net_banking_strategy(approval_rate));
        dispatcher.register(PaymentMethod::Wallet, wallet_strategy(approval_rate));
        dispatcher
    }

    pub fn register(&self, method: PaymentMethod, strategy: ChargeStrategy) {
        if self.strategies.write().insert(method, strategy).is_some() {
            info!(?method, "Replaced payment strategy");
        }
    }

    pub fn is_supported(&self, method: PaymentMethod) -> bool {
        self.strategies.read().contains_key(&method)
    }

    pub fn dispatch(&self, request: &PaymentRequest) -> ChargeResult {
        // Clone out so a slow strategy never holds the lock
        let strategy = self.strategies.read().get(&request.method).cloned();
        match strategy {
            Some(strategy) => {
                let result = strategy(request);
                if result.success {
                    info!(method = ?request.method, transaction = ?result.transaction_id, "Payment approved");
                } else {
                    warn!(method = ?request.method, reason = %result.message, "Payment not approved");
                }
                result
            }
            None => {
                warn!(method = ?request.method, "No payment strategy registered");
                ChargeResult::declined(
                    format!("Unsupported payment method: {:?}", request.method),
                    "none",
                )
            }
        }
    }
}
