//! In-process provider with scripted outcomes.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::{
    PaymentError, PaymentIntent, PaymentIntentRequest, PaymentIntentStatus, PaymentProvider,
};

#[derive(Debug, Default)]
struct Script {
    statuses: VecDeque<PaymentIntentStatus>,
    fail_create: bool,
    undo_failures: u32,
    created: Vec<PaymentIntentRequest>,
    cancel_attempts: Vec<String>,
    cancelled: Vec<String>,
    refund_attempts: Vec<String>,
    refunded: Vec<String>,
}

impl Script {
    fn undo_fails(&mut self) -> bool {
        if self.undo_failures == 0 {
            return false;
        }
        self.undo_failures -= 1;
        true
    }
}

/// Payment provider that records every call and answers from a script.
///
/// Intents succeed unless a status was queued with
/// [`ScriptedProvider::push_status`].
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    script: Mutex<Script>,
}

impl ScriptedProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Status of the next created intent.
    pub fn push_status(&self, status: PaymentIntentStatus) {
        self.script().statuses.push_back(status);
    }

    /// Make every intent creation fail.
    pub fn fail_create(&self) {
        self.script().fail_create = true;
    }

    /// Make the next `count` cancel or refund attempts fail.
    pub fn fail_compensations(&self, count: u32) {
        self.script().undo_failures = count;
    }

    /// Requests that created an intent, in order.
    #[must_use]
    pub fn created(&self) -> Vec<PaymentIntentRequest> {
        self.script().created.clone()
    }

    /// Every cancel call, successful or not.
    #[must_use]
    pub fn cancel_attempts(&self) -> Vec<String> {
        self.script().cancel_attempts.clone()
    }

    /// Intents that were cancelled successfully.
    #[must_use]
    pub fn cancelled(&self) -> Vec<String> {
        self.script().cancelled.clone()
    }

    /// Every refund call, successful or not.
    #[must_use]
    pub fn refund_attempts(&self) -> Vec<String> {
        self.script().refund_attempts.clone()
    }

    /// Intents that were refunded successfully.
    #[must_use]
    pub fn refunded(&self) -> Vec<String> {
        self.script().refunded.clone()
    }
}

#[async_trait]
impl PaymentProvider for ScriptedProvider {
    async fn create_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, PaymentError> {
        let mut script = self.script();
        if script.fail_create {
            return Err(PaymentError::Unavailable("scripted create failure".to_owned()));
        }

        script.created.push(request.clone());
        let n = script.created.len();
        let status = script
            .statuses
            .pop_front()
            .unwrap_or(PaymentIntentStatus::Succeeded);
        Ok(PaymentIntent {
            id: format!("pi_scripted_{n}"),
            status,
            client_secret: Some(format!("pi_scripted_{n}_secret")),
        })
    }

    async fn cancel_payment_intent(&self, intent_id: &str) -> Result<(), PaymentError> {
        let mut script = self.script();
        script.cancel_attempts.push(intent_id.to_owned());
        if script.undo_fails() {
            return Err(PaymentError::Unavailable("scripted cancel failure".to_owned()));
        }
        script.cancelled.push(intent_id.to_owned());
        Ok(())
    }

    async fn refund_payment_intent(&self, intent_id: &str) -> Result<(), PaymentError> {
        let mut script = self.script();
        script.refund_attempts.push(intent_id.to_owned());
        if script.undo_fails() {
            return Err(PaymentError::Unavailable("scripted refund failure".to_owned()));
        }
        script.refunded.push(intent_id.to_owned());
        Ok(())
    }
}
