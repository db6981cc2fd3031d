//! The registration wizard.
//!
//! [`Wizard`] owns one [`WizardState`] and keeps its derived values (price,
//! coupon discount, amount due, derived dates and the step plan) consistent
//! after every answer. All mutations take `&mut self`, so a wizard can never
//! run two submissions at once. Once a registration has been accepted by the
//! CRM the wizard is frozen and every mutating call returns
//! [`WizardError::Completed`].
//!
//! Every answer is applied to a copy of the state first; the copy only
//! replaces the live state when re-derivation succeeds, so a failed call
//! leaves the wizard exactly as it was.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::calculations::common::to_cents;
use crate::calculations::coupons::{CouponContext, CouponRejection, CouponValidator, normalize_code};
use crate::calculations::dates::{DateError, compute_derived_dates};
use crate::calculations::pricing::{PricingError, apply_discount, compute_amount_due};
use crate::calculations::steps::{Prefill, Step, StepDiff, determine_steps};
use crate::calculations::submission::{RegistrationPayload, SubmissionError};
use crate::gateway::{
    CouponSource, GatewayError, PaymentIntentRequest, PaymentMethodToken, RegistrationGateway,
    WebhookKind,
};
use crate::models::{
    AppliedCoupon, Attendance, BlockId, Billing, Contact, Format, PaymentMethod, Phase,
    ProgramCatalog, SessionRecord, WizardState,
};
use crate::validation::{FieldError, validate_contact, validate_payment};

#[derive(Debug, Error)]
pub enum WizardError {
    #[error("This registration has already been submitted")]
    Completed,

    #[error("{}", join_messages(.0))]
    Validation(Vec<FieldError>),

    /// The processor's message, shown to the registrant verbatim.
    #[error("{0}")]
    Payment(String),

    #[error("Unknown program '{0}'")]
    UnknownProgram(String),

    #[error(transparent)]
    Upstream(#[from] GatewayError),

    #[error(transparent)]
    Pricing(#[from] PricingError),

    #[error(transparent)]
    Dates(#[from] DateError),

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error("Could not encode registration: {0}")]
    Encode(#[from] serde_json::Error),
}

fn join_messages(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

fn payment_failed(err: GatewayError) -> WizardError {
    error!(error = %err, "card payment failed");
    match err {
        GatewayError::Declined(message) => WizardError::Payment(message),
        other => WizardError::Payment(other.to_string()),
    }
}

fn field_error(
    field: &'static str,
    message: impl Into<String>,
) -> FieldError {
    FieldError {
        field,
        message: message.into(),
    }
}

/// Result of [`Wizard::apply_coupon`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CouponOutcome {
    Applied(AppliedCoupon),
    /// The code matched the coupon already applied, which was removed.
    Removed(String),
    /// Shown inline next to the coupon field. The state is unchanged.
    Rejected(CouponRejection),
}

/// What the registrant sees after a successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Confirmation {
    pub registration_code: String,
    pub amount_due: Decimal,
    pub payment_intent_id: Option<String>,
}

/// A confirmed charge together with the registration it paid for.
#[derive(Debug, Clone)]
struct CompletedPayment {
    payment_intent_id: String,
    registration_code: String,
    program: String,
    session_id: String,
    attendance_type: String,
    amount_due: Decimal,
}

impl CompletedPayment {
    fn new(
        payment_intent_id: String,
        payload: &RegistrationPayload,
    ) -> Self {
        Self {
            payment_intent_id,
            registration_code: payload.registration_code.clone(),
            program: payload.program.clone(),
            session_id: payload.session_id.clone(),
            attendance_type: payload.attendance_type.clone(),
            amount_due: payload.amount_due,
        }
    }

    /// True when this charge was made for exactly the registration in `payload`.
    fn covers(
        &self,
        payload: &RegistrationPayload,
    ) -> bool {
        self.registration_code == payload.registration_code
            && self.program == payload.program
            && self.session_id == payload.session_id
            && self.attendance_type == payload.attendance_type
            && self.amount_due == payload.amount_due
    }
}

pub struct Wizard {
    catalog: ProgramCatalog,
    coupons: CouponValidator,
    prefill: Prefill,
    state: WizardState,
    steps: Vec<Step>,
    cursor: usize,
    today: NaiveDate,
    // A charge that went through but whose CRM submission failed. Reused when
    // the same registration is retried.
    payment: Option<CompletedPayment>,
}

impl Wizard {
    /// A wizard with nothing pre-filled.
    pub fn new(
        catalog: ProgramCatalog,
        coupons: CouponValidator,
        today: NaiveDate,
    ) -> Self {
        let prefill = Prefill::default();
        let steps = determine_steps(&prefill, None, None);
        Self {
            catalog,
            coupons,
            prefill,
            state: WizardState::default(),
            steps,
            cursor: 0,
            today,
            payment: None,
        }
    }

    /// A wizard pre-filled from URL query parameters.
    pub fn from_query(
        query: &str,
        catalog: ProgramCatalog,
        coupons: CouponValidator,
        today: NaiveDate,
    ) -> Result<Self, WizardError> {
        let prefill = Prefill::from_query(query, &catalog);
        Self::from_prefill(prefill, catalog, coupons, today)
    }

    pub fn from_prefill(
        prefill: Prefill,
        catalog: ProgramCatalog,
        coupons: CouponValidator,
        today: NaiveDate,
    ) -> Result<Self, WizardError> {
        let mut wizard = Self::new(catalog, coupons, today);

        let mut state = WizardState {
            format: prefill.format,
            program: prefill.program.clone(),
            attendance: prefill.attendance.clone().unwrap_or_default(),
            session_id: prefill.session_id.clone(),
            ..WizardState::default()
        };
        wizard.derive(&mut state)?;
        wizard.state = state;
        wizard.prefill = prefill;
        wizard.replan();

        info!(steps = ?wizard.steps, "wizard started");
        Ok(wizard)
    }

    pub fn state(&self) -> &WizardState {
        &self.state
    }

    pub fn into_state(self) -> WizardState {
        self.state
    }

    pub fn catalog(&self) -> &ProgramCatalog {
        &self.catalog
    }

    pub fn prefill(&self) -> &Prefill {
        &self.prefill
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// Steps still to be asked, in order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn current_step(&self) -> Step {
        self.steps
            .get(self.cursor)
            .copied()
            .unwrap_or(Step::Payment)
    }

    pub fn is_completed(&self) -> bool {
        self.state.is_completed()
    }

    // ── answers ──────────────────────────────────────────────────────────

    /// On-Demand registrations are always for the full program.
    pub fn select_format(
        &mut self,
        format: Format,
    ) -> Result<StepDiff, WizardError> {
        info!(format = %format, "format selected");
        self.update(|s| s.format = Some(format))
    }

    /// Accepts a program slug or canonical name. Changing the program resets
    /// attendance to Full and forgets a session picked for another program.
    pub fn select_program(
        &mut self,
        name_or_slug: &str,
    ) -> Result<StepDiff, WizardError> {
        let program = self
            .catalog
            .resolve(name_or_slug)
            .ok_or_else(|| WizardError::UnknownProgram(name_or_slug.to_string()))?;
        let name = program.name.clone();
        let session_prefilled = self.prefill.session_id.is_some();

        info!(program = %name, "program selected");
        self.update(|s| {
            if s.program.as_deref() == Some(name.as_str()) {
                return;
            }
            s.attendance = Attendance::Full;

            let other_program = s
                .session
                .as_ref()
                .and_then(|session| session.program.as_deref())
                .is_some_and(|p| !p.eq_ignore_ascii_case(&name));
            if other_program && !session_prefilled {
                s.session = None;
                s.session_id = None;
            }
            s.program = Some(name);
        })
    }

    /// Selects individual blocks. An empty list means full attendance.
    pub fn select_blocks<I>(
        &mut self,
        blocks: I,
    ) -> Result<StepDiff, WizardError>
    where
        I: IntoIterator<Item = BlockId>,
    {
        let attendance = Attendance::from_blocks(blocks);

        let program = self
            .state
            .program
            .as_deref()
            .and_then(|name| self.catalog.by_name(name))
            .ok_or_else(|| {
                WizardError::Validation(vec![field_error("program", "Please select a program")])
            })?;
        if !attendance.is_full() && !program.has_blocks() {
            return Err(WizardError::Validation(vec![field_error(
                "blocks",
                format!("{} is only sold as a full program", program.name),
            )]));
        }

        info!(attendance = %attendance.attendance_type(), "attendance selected");
        self.update(|s| s.attendance = attendance)
    }

    pub fn select_full(&mut self) -> Result<StepDiff, WizardError> {
        self.select_blocks(std::iter::empty())
    }

    pub fn select_session(
        &mut self,
        session: SessionRecord,
    ) -> Result<StepDiff, WizardError> {
        info!(session = %session.id, "session selected");
        self.update(|s| {
            s.session_id = Some(session.id.clone());
            s.session = Some(session);
        })
    }

    /// Fetches the session whose id was pre-filled or previously chosen.
    pub async fn load_session<G>(
        &mut self,
        gateway: &G,
    ) -> Result<StepDiff, WizardError>
    where
        G: RegistrationGateway + ?Sized,
    {
        self.ensure_editing()?;
        let id = self.state.session_id.clone().ok_or_else(|| {
            WizardError::Validation(vec![field_error("session", "Please select a session")])
        })?;

        match gateway.fetch_session(&id).await {
            Ok(session) => self.select_session(session),
            Err(GatewayError::NotFound) => {
                error!(session = %id, "session not found, asking for one instead");
                if self.prefill.session_id.as_deref() == Some(id.as_str()) {
                    self.prefill.session_id = None;
                }
                self.state.session_id = None;
                self.state.session = None;
                self.replan();
                if let Some(index) = self.steps.iter().position(|s| *s == Step::Session) {
                    self.cursor = index;
                }
                Err(WizardError::Upstream(GatewayError::NotFound))
            }
            Err(e) => {
                error!(session = %id, error = %e, "session lookup failed");
                Err(WizardError::Upstream(e))
            }
        }
    }

    pub fn set_contact(
        &mut self,
        contact: Contact,
    ) -> Result<(), WizardError> {
        self.ensure_editing()?;
        self.state.contact = contact;
        Ok(())
    }

    pub fn set_billing(
        &mut self,
        billing: Option<Billing>,
    ) -> Result<(), WizardError> {
        self.ensure_editing()?;
        self.state.billing = billing;
        Ok(())
    }

    pub fn set_payment_method(
        &mut self,
        method: PaymentMethod,
    ) -> Result<(), WizardError> {
        self.ensure_editing()?;
        debug!(method = method.as_str(), "payment method selected");
        self.state.payment_method = method;
        Ok(())
    }

    // ── navigation ───────────────────────────────────────────────────────

    /// Moves to the next step once the current one is complete. Stays on the
    /// last step.
    pub fn advance(&mut self) -> Result<Step, WizardError> {
        self.ensure_editing()?;
        let step = self.current_step();
        let errors = self.step_errors(step);
        if !errors.is_empty() {
            warn!(step = %step, errors = errors.len(), "step is incomplete");
            return Err(WizardError::Validation(errors));
        }

        if self.cursor + 1 < self.steps.len() {
            self.cursor += 1;
        }
        Ok(self.current_step())
    }

    pub fn back(&mut self) -> Step {
        self.cursor = self.cursor.saturating_sub(1);
        self.current_step()
    }

    fn step_errors(
        &self,
        step: Step,
    ) -> Vec<FieldError> {
        match step {
            Step::Format if self.state.format.is_none() => {
                vec![field_error("format", SubmissionError::MissingFormat.to_string())]
            }
            Step::Program if self.state.program.is_none() => {
                vec![field_error("program", SubmissionError::MissingProgram.to_string())]
            }
            Step::Session if self.state.session.is_none() => {
                vec![field_error("session", SubmissionError::MissingSession.to_string())]
            }
            Step::Contact => validate_contact(&self.state.contact),
            Step::Payment => {
                validate_payment(self.state.payment_method, self.state.billing.as_ref())
            }
            _ => Vec::new(),
        }
    }

    // ── coupons ──────────────────────────────────────────────────────────

    /// Applies `code`, or removes it when it is the coupon already applied.
    ///
    /// Rejections are not errors: they come back as
    /// [`CouponOutcome::Rejected`] and leave the state untouched.
    pub async fn apply_coupon<S>(
        &mut self,
        code: &str,
        source: &S,
    ) -> Result<CouponOutcome, WizardError>
    where
        S: CouponSource + ?Sized,
    {
        self.ensure_editing()?;
        let code = normalize_code(code);

        if let Some(applied) = &self.state.coupon {
            if !code.is_empty() && applied.code.eq_ignore_ascii_case(&code) {
                let removed = applied.code.clone();
                self.update(|s| s.coupon = None)?;
                info!(code = %removed, "coupon removed");
                return Ok(CouponOutcome::Removed(removed));
            }
        }

        let Some(program) = self
            .state
            .program
            .as_deref()
            .and_then(|name| self.catalog.by_name(name))
        else {
            return Ok(CouponOutcome::Rejected(CouponRejection::NoProgram));
        };

        let ctx = CouponContext {
            program,
            attendance: &self.state.attendance,
            base_price: self.state.base_price,
            today: self.today,
        };
        let result = self.coupons.validate(&code, &ctx, source).await;

        match result {
            Ok(applied) => {
                info!(code = %applied.code, amount = %applied.amount, "coupon applied");
                self.update(|s| s.coupon = Some(applied.clone()))?;
                Ok(CouponOutcome::Applied(applied))
            }
            Err(rejection) => {
                warn!(%code, reason = %rejection, "coupon rejected");
                Ok(CouponOutcome::Rejected(rejection))
            }
        }
    }

    pub fn remove_coupon(&mut self) -> Result<StepDiff, WizardError> {
        self.update(|s| s.coupon = None)
    }

    // ── submission ───────────────────────────────────────────────────────

    /// Validates, charges the card when needed, then posts the registration
    /// to the CRM.
    ///
    /// The CRM is never called if the payment fails. A CRM failure leaves the
    /// wizard editable so the submission can be retried.
    pub async fn submit<G>(
        &mut self,
        gateway: &G,
        card: Option<&PaymentMethodToken>,
    ) -> Result<Confirmation, WizardError>
    where
        G: RegistrationGateway + ?Sized,
    {
        self.ensure_editing()?;

        let mut errors = Vec::new();
        for step in [Step::Format, Step::Program, Step::Session] {
            errors.extend(self.step_errors(step));
        }
        errors.extend(self.step_errors(Step::Contact));
        errors.extend(self.step_errors(Step::Payment));
        if !errors.is_empty() {
            warn!(errors = errors.len(), "registration is incomplete");
            return Err(WizardError::Validation(errors));
        }

        let payload = RegistrationPayload::build(&self.state, &self.catalog, self.today)?;
        let amount_due = self.state.amount_due;

        let payment_intent_id = match self.state.payment_method {
            PaymentMethod::Stripe if amount_due > Decimal::ZERO => {
                Some(self.collect_payment(gateway, card, &payload).await?)
            }
            PaymentMethod::Stripe => {
                info!("nothing to charge, skipping card payment");
                None
            }
            PaymentMethod::Invoice => None,
        };

        let body = serde_json::to_value(&payload)?;
        gateway
            .submit_to_crm(WebhookKind::Registration, &body)
            .await
            .map_err(|e| {
                error!(code = %payload.registration_code, error = %e, "CRM submission failed");
                WizardError::Upstream(e)
            })?;

        self.state.registration_code = Some(payload.registration_code.clone());
        self.state.phase = Phase::Completed;
        self.payment = None;
        info!(
            code = %payload.registration_code,
            amount_due = %amount_due,
            method = self.state.payment_method.as_str(),
            "registration submitted"
        );

        Ok(Confirmation {
            registration_code: payload.registration_code,
            amount_due,
            payment_intent_id,
        })
    }

    async fn collect_payment<G>(
        &mut self,
        gateway: &G,
        card: Option<&PaymentMethodToken>,
        payload: &RegistrationPayload,
    ) -> Result<String, WizardError>
    where
        G: RegistrationGateway + ?Sized,
    {
        if let Some(paid) = &self.payment {
            if paid.covers(payload) {
                debug!(intent = %paid.payment_intent_id, "reusing completed payment");
                return Ok(paid.payment_intent_id.clone());
            }
            warn!(
                intent = %paid.payment_intent_id,
                paid_for = %paid.registration_code,
                registration = %payload.registration_code,
                "registration changed since the last charge, charging again"
            );
        }

        let card = card
            .ok_or_else(|| WizardError::Payment("Please enter your card details".to_string()))?;
        let amount_cents = to_cents(payload.amount_due).ok_or_else(|| {
            WizardError::Payment(format!("Cannot charge {}", payload.amount_due))
        })?;

        let mut metadata = BTreeMap::new();
        metadata.insert("registrationCode".to_string(), payload.registration_code.clone());
        metadata.insert("program".to_string(), payload.program.clone());
        metadata.insert("sessionId".to_string(), payload.session_id.clone());
        metadata.insert("attendanceType".to_string(), payload.attendance_type.clone());

        let request = PaymentIntentRequest {
            amount_cents,
            email: payload.email.clone(),
            description: format!("{} ({})", payload.program, payload.attendance_type),
            metadata,
        };

        let intent = gateway
            .create_payment_intent(&request)
            .await
            .map_err(payment_failed)?;
        let confirmation = gateway
            .confirm_payment(&intent, card)
            .await
            .map_err(payment_failed)?;

        if confirmation.status != "succeeded" && confirmation.status != "processing" {
            warn!(status = %confirmation.status, "payment was not completed");
            return Err(WizardError::Payment(format!(
                "Payment was not completed (status: {})",
                confirmation.status
            )));
        }

        info!(intent = %confirmation.payment_intent_id, amount_cents, "payment confirmed");
        self.payment = Some(CompletedPayment::new(
            confirmation.payment_intent_id.clone(),
            payload,
        ));
        Ok(confirmation.payment_intent_id)
    }

    // ── derivation ───────────────────────────────────────────────────────

    fn ensure_editing(&self) -> Result<(), WizardError> {
        if self.state.is_completed() {
            warn!("ignoring change to a submitted registration");
            return Err(WizardError::Completed);
        }
        Ok(())
    }

    fn update<F>(
        &mut self,
        change: F,
    ) -> Result<StepDiff, WizardError>
    where
        F: FnOnce(&mut WizardState),
    {
        self.ensure_editing()?;
        let mut next = self.state.clone();
        change(&mut next);
        self.derive(&mut next)?;
        self.state = next;
        Ok(self.replan())
    }

    /// Recomputes price, coupon discount, amount due and derived dates.
    fn derive(
        &self,
        state: &mut WizardState,
    ) -> Result<(), WizardError> {
        if state.format == Some(Format::OnDemand) && !state.attendance.is_full() {
            debug!("on-demand registrations are always full");
            state.attendance = Attendance::Full;
        }

        let program = match state.program.as_deref() {
            Some(name) => Some(
                self.catalog
                    .by_name(name)
                    .ok_or_else(|| WizardError::UnknownProgram(name.to_string()))?,
            ),
            None => None,
        };
        let Some(program) = program else {
            state.base_price = Decimal::ZERO;
            state.coupon = None;
            state.coupon_discount = Decimal::ZERO;
            state.amount_due = Decimal::ZERO;
            state.derived_start = None;
            state.derived_end = None;
            return Ok(());
        };

        let quote = compute_amount_due(program, &state.attendance)?;
        if quote.upgraded {
            info!(program = %program.name, "block selection upgraded to full attendance");
        }
        state.attendance = quote.attendance;
        state.base_price = quote.base_price;

        if let Some(applied) = state.coupon.take() {
            let ctx = CouponContext {
                program,
                attendance: &state.attendance,
                base_price: state.base_price,
                today: self.today,
            };
            match self.coupons.reprice(&applied, &ctx) {
                Some(repriced) => state.coupon = Some(repriced),
                None => warn!(code = %applied.code, "coupon no longer applies, removing it"),
            }
        }

        let discount = state
            .coupon
            .as_ref()
            .map_or(Decimal::ZERO, |c| c.amount);
        let priced = apply_discount(state.base_price, discount);
        state.coupon_discount = priced.discount;
        state.amount_due = priced.amount_due;

        let range = match &state.session {
            Some(session) => match compute_derived_dates(session, program, &state.attendance) {
                Ok(range) => Some(range),
                Err(DateError::MissingStartDate) => None,
                Err(e) => return Err(e.into()),
            },
            None => None,
        };
        state.derived_start = range.map(|r| r.start);
        state.derived_end = range.map(|r| r.end);

        debug!(
            base_price = %state.base_price,
            discount = %state.coupon_discount,
            amount_due = %state.amount_due,
            derived_start = ?state.derived_start,
            derived_end = ?state.derived_end,
            "derived values updated"
        );
        Ok(())
    }

    /// Rebuilds the step plan. The cursor stays on the current step when it
    /// survives, otherwise it moves to the step that now follows it.
    fn replan(&mut self) -> StepDiff {
        let program = self
            .state
            .program
            .as_deref()
            .and_then(|name| self.catalog.by_name(name));
        let steps = determine_steps(&self.prefill, self.state.format, program);
        let diff = StepDiff::between(&self.steps, &steps);

        let current = self.steps.get(self.cursor).copied();
        self.cursor = current
            .and_then(|step| {
                steps
                    .iter()
                    .position(|s| *s == step)
                    .or_else(|| steps.iter().position(|s| *s > step))
            })
            .unwrap_or(0)
            .min(steps.len().saturating_sub(1));

        if !diff.is_empty() {
            debug!(inserted = ?diff.inserted, removed = ?diff.removed, "step plan changed");
        }
        self.steps = steps;
        diff
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::gateway::{PaymentConfirmation, PaymentIntent};
    use crate::models::{CouponRecord, DiscountType};

    // ── stub gateway ─────────────────────────────────────────────────────
    #[derive(Default)]
    struct StubGateway {
        sessions: HashMap<String, SessionRecord>,
        coupons: HashMap<String, CouponRecord>,
        decline: Option<String>,
        crm_down: bool,
        intents: Mutex<Vec<PaymentIntentRequest>>,
        crm: Mutex<Vec<(WebhookKind, serde_json::Value)>>,
    }

    impl StubGateway {
        fn with_denver() -> Self {
            let mut gw = Self::default();
            gw.sessions.insert("recDEN".to_string(), denver());
            gw
        }

        fn with_coupon(
            mut self,
            record: CouponRecord,
        ) -> Self {
            self.coupons.insert(record.code.to_uppercase(), record);
            self
        }

        fn intent_count(&self) -> usize {
            self.intents.lock().unwrap().len()
        }

        fn crm_calls(&self) -> Vec<(WebhookKind, serde_json::Value)> {
            self.crm.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CouponSource for StubGateway {
        async fn find_coupon(
            &self,
            code: &str,
        ) -> Result<Option<CouponRecord>, GatewayError> {
            Ok(self.coupons.get(&code.to_uppercase()).cloned())
        }
    }

    #[async_trait]
    impl RegistrationGateway for StubGateway {
        async fn fetch_session(
            &self,
            id: &str,
        ) -> Result<SessionRecord, GatewayError> {
            self.sessions.get(id).cloned().ok_or(GatewayError::NotFound)
        }

        async fn create_payment_intent(
            &self,
            request: &PaymentIntentRequest,
        ) -> Result<PaymentIntent, GatewayError> {
            self.intents.lock().unwrap().push(request.clone());
            Ok(PaymentIntent {
                client_secret: "pi_test_secret_abc".to_string(),
                payment_intent_id: "pi_test".to_string(),
            })
        }

        async fn confirm_payment(
            &self,
            intent: &PaymentIntent,
            _method: &PaymentMethodToken,
        ) -> Result<PaymentConfirmation, GatewayError> {
            match &self.decline {
                Some(message) => Err(GatewayError::Declined(message.clone())),
                None => Ok(PaymentConfirmation {
                    payment_intent_id: intent.payment_intent_id.clone(),
                    status: "succeeded".to_string(),
                }),
            }
        }

        async fn submit_to_crm(
            &self,
            kind: WebhookKind,
            payload: &serde_json::Value,
        ) -> Result<(), GatewayError> {
            if self.crm_down {
                return Err(GatewayError::Upstream {
                    status: 502,
                    body: "bad gateway".to_string(),
                });
            }
            self.crm.lock().unwrap().push((kind, payload.clone()));
            Ok(())
        }
    }

    // ── fixtures ─────────────────────────────────────────────────────────
    const ERL_QUERY: &str = "format=in-person&program=employee-relations-law&session=recDEN";

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn today() -> NaiveDate {
        date(2025, 1, 15)
    }

    fn denver() -> SessionRecord {
        SessionRecord {
            id: "recDEN".to_string(),
            program: Some("Certificate in Employee Relations Law".to_string()),
            format: Some(Format::InPerson),
            start_date: Some(date(2025, 3, 10)),
            end_date: Some(date(2025, 3, 14)),
            city: Some("Denver".to_string()),
            state: Some("CO".to_string()),
            venue: None,
        }
    }

    fn wizard(query: &str) -> Wizard {
        Wizard::from_query(
            query,
            ProgramCatalog::standard(),
            CouponValidator::standard(),
            today(),
        )
        .unwrap()
    }

    fn contact() -> Contact {
        Contact {
            first_name: "Dana".to_string(),
            last_name: "Reyes".to_string(),
            email: "dana@example.com".to_string(),
            company: "Acme".to_string(),
            ..Contact::default()
        }
    }

    fn remote(
        code: &str,
        discount_type: DiscountType,
        amount: Decimal,
        expires: Option<NaiveDate>,
    ) -> CouponRecord {
        CouponRecord {
            code: code.to_string(),
            active: true,
            expiration_date: expires,
            discount_amount: amount,
            discount_type,
        }
    }

    async fn ready_wizard(gw: &StubGateway) -> Wizard {
        let mut w = wizard(ERL_QUERY);
        w.load_session(gw).await.unwrap();
        w.set_contact(contact()).unwrap();
        w
    }

    fn card() -> PaymentMethodToken {
        PaymentMethodToken("pm_card_visa".to_string())
    }

    // =========================================================================
    // step plan
    // =========================================================================

    #[test]
    fn empty_query_asks_everything_but_blocks() {
        let w = Wizard::new(ProgramCatalog::standard(), CouponValidator::standard(), today());

        assert_eq!(
            w.steps(),
            &[Step::Format, Step::Program, Step::Session, Step::Contact, Step::Payment]
        );
        assert_eq!(w.current_step(), Step::Format);
    }

    #[test]
    fn fully_prefilled_query_only_asks_contact_and_payment() {
        let w = wizard(
            "format=in-person&program=employee-relations-law&blocks=block-1&session=recDEN",
        );

        assert_eq!(w.steps(), &[Step::Contact, Step::Payment]);
        assert_eq!(w.state().base_price, dec!(1375));
    }

    #[test]
    fn advancing_requires_an_answer() {
        let mut w = Wizard::new(ProgramCatalog::standard(), CouponValidator::standard(), today());

        match w.advance() {
            Err(WizardError::Validation(errors)) => assert_eq!(errors[0].field, "format"),
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(w.current_step(), Step::Format);
    }

    #[test]
    fn choosing_block_program_inserts_blocks_step() {
        let mut w = Wizard::new(ProgramCatalog::standard(), CouponValidator::standard(), today());
        w.select_format(Format::InPerson).unwrap();
        assert_eq!(w.advance().unwrap(), Step::Program);

        let diff = w.select_program("employee-relations-law").unwrap();

        assert_eq!(diff.inserted, vec![Step::Blocks]);
        assert_eq!(w.current_step(), Step::Program);
        assert_eq!(w.advance().unwrap(), Step::Blocks);
    }

    #[test]
    fn switching_to_on_demand_removes_blocks_and_moves_cursor() {
        let mut w = Wizard::new(ProgramCatalog::standard(), CouponValidator::standard(), today());
        w.select_format(Format::InPerson).unwrap();
        w.advance().unwrap();
        w.select_program("employee-relations-law").unwrap();
        w.advance().unwrap();
        w.select_blocks([BlockId(3)]).unwrap();
        assert_eq!(w.current_step(), Step::Blocks);

        let diff = w.select_format(Format::OnDemand).unwrap();

        assert_eq!(diff.removed, vec![Step::Blocks]);
        assert_eq!(w.current_step(), Step::Session);
        assert_eq!(w.state().attendance, Attendance::Full);
        assert_eq!(w.state().base_price, dec!(2375));
    }

    #[test]
    fn back_stops_at_first_step() {
        let mut w = Wizard::new(ProgramCatalog::standard(), CouponValidator::standard(), today());
        w.select_format(Format::Virtual).unwrap();
        w.advance().unwrap();

        assert_eq!(w.back(), Step::Format);
        assert_eq!(w.back(), Step::Format);
    }

    #[test]
    fn on_demand_prefill_ignores_blocks() {
        let w = wizard("format=on-demand&program=employee-relations-law&blocks=3");

        assert_eq!(w.state().attendance, Attendance::Full);
        assert_eq!(w.state().base_price, dec!(2375));
    }

    // =========================================================================
    // pricing and dates
    // =========================================================================

    #[test]
    fn full_program_price() {
        let w = wizard(ERL_QUERY);

        assert_eq!(w.state().base_price, dec!(2375));
        assert_eq!(w.state().amount_due, dec!(2375));
        assert_eq!(w.steps(), &[Step::Blocks, Step::Contact, Step::Payment]);
    }

    #[test]
    fn blocks_costing_full_price_upgrade_to_full() {
        let mut w = wizard(ERL_QUERY);

        w.select_blocks([BlockId(1), BlockId(2)]).unwrap();

        assert_eq!(w.state().attendance, Attendance::Full);
        assert_eq!(w.state().base_price, dec!(2375));
        assert_eq!(w.state().attendance_type(), "Full");
    }

    #[tokio::test]
    async fn single_block_price_and_dates() {
        let gw = StubGateway::with_denver();
        let mut w = wizard(ERL_QUERY);
        w.load_session(&gw).await.unwrap();

        w.select_blocks([BlockId(3)]).unwrap();

        assert_eq!(w.state().base_price, dec!(575));
        assert_eq!(w.state().derived_start, Some(date(2025, 3, 14)));
        assert_eq!(w.state().derived_end, Some(date(2025, 3, 14)));
    }

    #[tokio::test]
    async fn full_attendance_keeps_session_dates() {
        let gw = StubGateway::with_denver();
        let mut w = wizard(ERL_QUERY);

        w.load_session(&gw).await.unwrap();

        assert_eq!(w.state().derived_start, Some(date(2025, 3, 10)));
        assert_eq!(w.state().derived_end, Some(date(2025, 3, 14)));
    }

    #[tokio::test]
    async fn missing_session_surfaces_upstream_error() {
        let gw = StubGateway::default();
        let mut w = wizard(ERL_QUERY);

        let result = w.load_session(&gw).await;

        assert!(matches!(result, Err(WizardError::Upstream(GatewayError::NotFound))));
        assert_eq!(w.state().session, None);
    }

    #[tokio::test]
    async fn unknown_prefilled_session_brings_back_session_step() {
        let gw = StubGateway::with_denver();
        let mut w = wizard(
            "format=in-person&program=employee-relations-law&blocks=full&session=recNOPE",
        );
        assert!(!w.steps().contains(&Step::Session));

        let result = w.load_session(&gw).await;

        assert!(matches!(result, Err(WizardError::Upstream(GatewayError::NotFound))));
        assert_eq!(w.steps(), &[Step::Session, Step::Contact, Step::Payment]);
        assert_eq!(w.current_step(), Step::Session);
        assert_eq!(w.state().session_id, None);

        w.select_session(denver()).unwrap();
        w.set_contact(contact()).unwrap();
        let confirmation = w.submit(&gw, Some(&card())).await.unwrap();
        assert_eq!(confirmation.registration_code, "IP-AF-DEN-0325");
    }

    #[test]
    fn blocks_on_whole_only_program_are_refused() {
        let mut w = wizard("format=virtual&program=workplace-investigations");

        let result = w.select_blocks([BlockId(1)]);

        assert!(matches!(result, Err(WizardError::Validation(_))));
        assert_eq!(w.state().attendance, Attendance::Full);
    }

    #[test]
    fn unknown_block_leaves_state_unchanged() {
        let mut w = wizard(ERL_QUERY);
        w.select_blocks([BlockId(3)]).unwrap();

        let result = w.select_blocks([BlockId(9)]);

        assert!(matches!(result, Err(WizardError::Pricing(_))));
        assert_eq!(w.state().base_price, dec!(575));
    }

    #[test]
    fn unknown_program_is_refused() {
        let mut w = wizard("");

        assert!(matches!(
            w.select_program("underwater-basket-weaving"),
            Err(WizardError::UnknownProgram(_))
        ));
    }

    #[test]
    fn changing_program_resets_attendance() {
        let mut w = Wizard::new(ProgramCatalog::standard(), CouponValidator::standard(), today());
        w.select_program("employee-relations-law").unwrap();
        w.select_blocks([BlockId(3)]).unwrap();

        w.select_program("employee-benefits-law").unwrap();

        assert_eq!(w.state().attendance, Attendance::Full);
        assert_eq!(w.state().base_price, dec!(2375));
    }

    // =========================================================================
    // coupons
    // =========================================================================

    #[tokio::test]
    async fn static_coupon_reduces_amount_due() {
        let gw = StubGateway::default();
        let mut w = wizard(ERL_QUERY);

        let outcome = w.apply_coupon("pp500", &gw).await.unwrap();

        assert!(matches!(outcome, CouponOutcome::Applied(ref c) if c.code == "PP500"));
        assert_eq!(w.state().coupon_discount, dec!(500));
        assert_eq!(w.state().amount_due, dec!(1875));
    }

    #[tokio::test]
    async fn applying_same_code_twice_removes_it() {
        let gw = StubGateway::default();
        let mut w = wizard(ERL_QUERY);
        w.apply_coupon("PP500", &gw).await.unwrap();

        let outcome = w.apply_coupon(" pp500 ", &gw).await.unwrap();

        assert_eq!(outcome, CouponOutcome::Removed("PP500".to_string()));
        assert_eq!(w.state().coupon, None);
        assert_eq!(w.state().amount_due, dec!(2375));
    }

    #[tokio::test]
    async fn rejected_coupon_keeps_previous_one() {
        let gw = StubGateway::default();
        let mut w = wizard(ERL_QUERY);
        w.apply_coupon("PP500", &gw).await.unwrap();

        let outcome = w.apply_coupon("BLOCK100", &gw).await.unwrap();

        assert_eq!(
            outcome,
            CouponOutcome::Rejected(CouponRejection::BlocksOnly {
                code: "BLOCK100".to_string()
            })
        );
        assert_eq!(w.state().coupon.as_ref().map(|c| c.code.as_str()), Some("PP500"));
        assert_eq!(w.state().amount_due, dec!(1875));
    }

    #[tokio::test]
    async fn coupon_without_program_is_rejected() {
        let gw = StubGateway::default();
        let mut w = wizard("format=in-person");

        let outcome = w.apply_coupon("PP500", &gw).await.unwrap();

        assert_eq!(outcome, CouponOutcome::Rejected(CouponRejection::NoProgram));
    }

    #[tokio::test]
    async fn unknown_code_is_invalid() {
        let gw = StubGateway::default();
        let mut w = wizard(ERL_QUERY);

        let outcome = w.apply_coupon("NOPE", &gw).await.unwrap();

        assert_eq!(outcome, CouponOutcome::Rejected(CouponRejection::Invalid));
        assert_eq!(outcome_message(&outcome), "Invalid coupon code");
    }

    fn outcome_message(outcome: &CouponOutcome) -> String {
        match outcome {
            CouponOutcome::Rejected(r) => r.to_string(),
            other => format!("{other:?}"),
        }
    }

    #[tokio::test]
    async fn full_only_coupon_is_dropped_when_blocks_are_chosen() {
        let gw = StubGateway::default();
        let mut w = wizard(ERL_QUERY);
        w.apply_coupon("PP500", &gw).await.unwrap();

        w.select_blocks([BlockId(3)]).unwrap();

        assert_eq!(w.state().coupon, None);
        assert_eq!(w.state().amount_due, dec!(575));
    }

    #[tokio::test]
    async fn remote_percent_coupon_is_repriced_with_attendance() {
        let gw = StubGateway::default().with_coupon(remote(
            "SPRING25",
            DiscountType::Percent,
            dec!(25),
            Some(today()),
        ));
        let mut w = wizard(ERL_QUERY);

        w.apply_coupon("spring25", &gw).await.unwrap();
        assert_eq!(w.state().coupon_discount, dec!(594));
        assert_eq!(w.state().amount_due, dec!(1781));

        w.select_blocks([BlockId(3)]).unwrap();
        assert_eq!(w.state().coupon_discount, dec!(144));
        assert_eq!(w.state().amount_due, dec!(431));
    }

    #[tokio::test]
    async fn expired_remote_coupon_is_rejected() {
        let gw = StubGateway::default().with_coupon(remote(
            "WINTER",
            DiscountType::Flat,
            dec!(200),
            Some(date(2025, 1, 14)),
        ));
        let mut w = wizard(ERL_QUERY);

        let outcome = w.apply_coupon("WINTER", &gw).await.unwrap();

        assert!(matches!(
            outcome,
            CouponOutcome::Rejected(CouponRejection::Expired { .. })
        ));
        assert_eq!(w.state().amount_due, dec!(2375));
    }

    #[tokio::test]
    async fn flat_coupon_larger_than_price_is_clamped() {
        let gw = StubGateway::default().with_coupon(remote(
            "BIGFLAT",
            DiscountType::Flat,
            dec!(5000),
            None,
        ));
        let mut w = wizard(ERL_QUERY);

        w.apply_coupon("BIGFLAT", &gw).await.unwrap();

        assert_eq!(w.state().coupon_discount, dec!(2375));
        assert_eq!(w.state().amount_due, dec!(0));
    }

    // =========================================================================
    // submission
    // =========================================================================

    #[tokio::test]
    async fn card_registration_charges_then_posts_to_crm() {
        let gw = StubGateway::with_denver();
        let mut w = ready_wizard(&gw).await;

        let confirmation = w.submit(&gw, Some(&card())).await.unwrap();

        assert_eq!(confirmation.registration_code, "IP-AF-DEN-0325");
        assert_eq!(confirmation.amount_due, dec!(2375));
        assert_eq!(confirmation.payment_intent_id.as_deref(), Some("pi_test"));

        let intents = gw.intents.lock().unwrap().clone();
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].amount_cents, 237_500);
        assert_eq!(intents[0].metadata["registrationCode"], "IP-AF-DEN-0325");

        let crm = gw.crm_calls();
        assert_eq!(crm.len(), 1);
        assert_eq!(crm[0].0, WebhookKind::Registration);
        assert_eq!(crm[0].1["registrationCode"], "IP-AF-DEN-0325");
        assert_eq!(crm[0].1["startDate"], "2025-03-10");

        assert!(w.is_completed());
        assert_eq!(w.state().registration_code.as_deref(), Some("IP-AF-DEN-0325"));
    }

    #[tokio::test]
    async fn declined_card_skips_crm() {
        let mut gw = StubGateway::with_denver();
        gw.decline = Some("Your card was declined.".to_string());
        let mut w = ready_wizard(&gw).await;

        let result = w.submit(&gw, Some(&card())).await;

        match result {
            Err(WizardError::Payment(message)) => assert_eq!(message, "Your card was declined."),
            other => panic!("expected payment error, got {other:?}"),
        }
        assert!(gw.crm_calls().is_empty());
        assert!(!w.is_completed());
    }

    #[tokio::test]
    async fn missing_card_is_a_payment_error() {
        let gw = StubGateway::with_denver();
        let mut w = ready_wizard(&gw).await;

        let result = w.submit(&gw, None).await;

        assert!(matches!(result, Err(WizardError::Payment(_))));
        assert_eq!(gw.intent_count(), 0);
        assert!(gw.crm_calls().is_empty());
    }

    #[tokio::test]
    async fn invoice_registration_skips_payment_and_sends_billing() {
        let gw = StubGateway::with_denver();
        let mut w = ready_wizard(&gw).await;
        w.set_payment_method(PaymentMethod::Invoice).unwrap();
        w.set_billing(Some(Billing {
            contact_name: "Accounts Payable".to_string(),
            email: "ap@example.com".to_string(),
            address: "1 Main St".to_string(),
            city: "Denver".to_string(),
            state: "CO".to_string(),
            zip: "80202".to_string(),
            ..Billing::default()
        }))
        .unwrap();

        let confirmation = w.submit(&gw, None).await.unwrap();

        assert_eq!(confirmation.payment_intent_id, None);
        assert_eq!(gw.intent_count(), 0);
        let crm = gw.crm_calls();
        assert_eq!(crm[0].1["paymentMethod"], "invoice");
        assert_eq!(crm[0].1["billing"]["zip"], "80202");
    }

    #[tokio::test]
    async fn invoice_without_billing_is_invalid() {
        let gw = StubGateway::with_denver();
        let mut w = ready_wizard(&gw).await;
        w.set_payment_method(PaymentMethod::Invoice).unwrap();

        let result = w.submit(&gw, None).await;

        assert!(matches!(result, Err(WizardError::Validation(ref e)) if e[0].field == "billing"));
        assert!(gw.crm_calls().is_empty());
    }

    #[tokio::test]
    async fn zero_amount_card_registration_skips_payment() {
        let gw = StubGateway::with_denver().with_coupon(remote(
            "SCHOLAR",
            DiscountType::Percent,
            dec!(100),
            None,
        ));
        let mut w = ready_wizard(&gw).await;
        w.apply_coupon("SCHOLAR", &gw).await.unwrap();

        let confirmation = w.submit(&gw, None).await.unwrap();

        assert_eq!(confirmation.amount_due, dec!(0));
        assert_eq!(gw.intent_count(), 0);
        assert_eq!(gw.crm_calls().len(), 1);
    }

    #[tokio::test]
    async fn incomplete_contact_blocks_submission() {
        let gw = StubGateway::with_denver();
        let mut w = wizard(ERL_QUERY);
        w.load_session(&gw).await.unwrap();

        let result = w.submit(&gw, Some(&card())).await;

        match result {
            Err(WizardError::Validation(errors)) => {
                let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
                assert_eq!(fields, vec!["firstName", "lastName", "email"]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(gw.intent_count(), 0);
    }

    #[tokio::test]
    async fn unloaded_session_blocks_submission() {
        let gw = StubGateway::with_denver();
        let mut w = wizard(ERL_QUERY);
        w.set_contact(contact()).unwrap();

        let result = w.submit(&gw, Some(&card())).await;

        assert!(matches!(result, Err(WizardError::Validation(ref e)) if e[0].field == "session"));
    }

    #[tokio::test]
    async fn crm_failure_can_be_retried_without_recharging() {
        let mut down = StubGateway::with_denver();
        down.crm_down = true;
        let mut w = ready_wizard(&down).await;

        let first = w.submit(&down, Some(&card())).await;
        assert!(matches!(
            first,
            Err(WizardError::Upstream(GatewayError::Upstream { status: 502, .. }))
        ));
        assert!(!w.is_completed());
        assert_eq!(down.intent_count(), 1);

        let up = StubGateway::with_denver();
        let confirmation = w.submit(&up, Some(&card())).await.unwrap();

        assert_eq!(confirmation.payment_intent_id.as_deref(), Some("pi_test"));
        assert_eq!(up.intent_count(), 0);
        assert_eq!(up.crm_calls().len(), 1);
    }

    #[tokio::test]
    async fn crm_retry_charges_again_after_program_change() {
        let mut down = StubGateway::with_denver();
        down.crm_down = true;
        let mut w = ready_wizard(&down).await;

        assert!(w.submit(&down, Some(&card())).await.is_err());
        assert_eq!(down.intent_count(), 1);
        let paid_for = down.intents.lock().unwrap()[0].metadata["registrationCode"].clone();
        assert_eq!(paid_for, "IP-AF-DEN-0325");

        let before = w.state().amount_due;
        w.select_program("employee-benefits-law").unwrap();
        assert_eq!(w.state().amount_due, before);

        let up = StubGateway::with_denver();
        let confirmation = w.submit(&up, Some(&card())).await.unwrap();

        assert_eq!(confirmation.registration_code, "IP-BF-DEN-0325");
        assert_eq!(up.intent_count(), 1);
        assert_eq!(
            up.intents.lock().unwrap()[0].metadata["registrationCode"],
            "IP-BF-DEN-0325"
        );
        assert_eq!(up.crm_calls().len(), 1);
    }

    #[tokio::test]
    async fn crm_retry_without_card_is_refused_after_program_change() {
        let mut down = StubGateway::with_denver();
        down.crm_down = true;
        let mut w = ready_wizard(&down).await;
        assert!(w.submit(&down, Some(&card())).await.is_err());

        w.select_program("employee-benefits-law").unwrap();
        let up = StubGateway::with_denver();
        let result = w.submit(&up, None).await;

        assert!(matches!(result, Err(WizardError::Payment(_))));
        assert!(up.crm_calls().is_empty());
    }

    #[tokio::test]
    async fn completed_wizard_refuses_changes() {
        let gw = StubGateway::with_denver();
        let mut w = ready_wizard(&gw).await;
        w.submit(&gw, Some(&card())).await.unwrap();
        let before = w.state().clone();

        assert!(matches!(w.select_full(), Err(WizardError::Completed)));
        assert!(matches!(w.set_contact(Contact::default()), Err(WizardError::Completed)));
        assert!(matches!(
            w.apply_coupon("PP500", &gw).await,
            Err(WizardError::Completed)
        ));
        assert!(matches!(
            w.submit(&gw, Some(&card())).await,
            Err(WizardError::Completed)
        ));
        assert_eq!(w.state(), &before);
        assert_eq!(gw.crm_calls().len(), 1);
    }
}
