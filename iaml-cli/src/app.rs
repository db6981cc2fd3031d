use std::fmt;

use anyhow::{Context, Result, anyhow, bail};
use chrono::NaiveDate;
use iaml_core::calculations::{
    CouponContext, CouponValidator, DateRange, Prefill, Step, apply_discount, compute_amount_due,
    compute_derived_dates, determine_steps, registration_code,
};
use iaml_core::gateway::{CouponSource, GatewayConfig, GatewayRegistry, PaymentMethodToken, RegistrationGateway};
use iaml_core::{
    AppliedCoupon, Attendance, BlockId, Confirmation, CouponOutcome, Format, PaymentMethod,
    ProgramCatalog, SessionRecord, Wizard,
};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::answers::Answers;

pub fn build_registry() -> GatewayRegistry {
    iaml_gateway::default_registry()
}

pub async fn connect(config: &GatewayConfig) -> Result<Box<dyn RegistrationGateway>> {
    debug!(backend = %config.backend, "creating gateway");
    build_registry()
        .create(config)
        .await
        .with_context(|| format!("Failed to create '{}' gateway", config.backend))
}

/// Comma-separated block numbers, e.g. `1,3`. `full` or empty means the
/// whole program.
pub fn parse_blocks(raw: &str) -> Result<Attendance> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("full") {
        return Ok(Attendance::Full);
    }
    let blocks = raw
        .split(',')
        .map(|part| BlockId::parse(part).ok_or_else(|| anyhow!("invalid block '{}'", part.trim())))
        .collect::<Result<Vec<_>>>()?;
    Ok(Attendance::from_blocks(blocks))
}

fn parse_format(raw: &str) -> Result<Format> {
    Format::parse(raw).ok_or_else(|| anyhow!("unknown format '{raw}'"))
}

// ====================
// plan
// ====================

/// Steps still to be asked for a landing-page query.
pub fn plan(
    query: &str,
    catalog: &ProgramCatalog,
) -> Vec<Step> {
    let prefill = Prefill::from_query(query, catalog);
    let program = prefill.program.as_deref().and_then(|name| catalog.by_name(name));
    determine_steps(&prefill, prefill.format, program)
}

// ====================
// quote
// ====================

#[derive(Debug, Clone, Default)]
pub struct QuoteRequest {
    pub program: String,
    pub attendance: Attendance,
    pub coupon: Option<String>,
    pub session_start: Option<NaiveDate>,
    pub session_end: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuoteReport {
    pub program: String,
    pub attendance: Attendance,
    pub base_price: Decimal,
    pub upgraded: bool,
    pub coupon: Option<AppliedCoupon>,
    /// Why the requested coupon was not applied.
    pub coupon_message: Option<String>,
    pub discount: Decimal,
    pub amount_due: Decimal,
    pub dates: Option<DateRange>,
}

pub async fn quote<S>(
    request: &QuoteRequest,
    catalog: &ProgramCatalog,
    coupons: &CouponValidator,
    source: &S,
    today: NaiveDate,
) -> Result<QuoteReport>
where
    S: CouponSource + ?Sized,
{
    let program = catalog
        .resolve(&request.program)
        .ok_or_else(|| anyhow!("unknown program '{}'", request.program))?;
    let price = compute_amount_due(program, &request.attendance)?;

    let mut coupon = None;
    let mut coupon_message = None;
    if let Some(code) = request.coupon.as_deref() {
        let ctx = CouponContext {
            program,
            attendance: &price.attendance,
            base_price: price.base_price,
            today,
        };
        match coupons.validate(code, &ctx, source).await {
            Ok(applied) => coupon = Some(applied),
            Err(rejection) => {
                warn!(%code, reason = %rejection, "coupon not applied to quote");
                coupon_message = Some(rejection.to_string());
            }
        }
    }

    let discounted = apply_discount(
        price.base_price,
        coupon.as_ref().map_or(Decimal::ZERO, |c| c.amount),
    );

    let dates = match request.session_start {
        Some(start) => {
            let session = SessionRecord {
                id: "quote".to_string(),
                program: Some(program.name.clone()),
                format: None,
                start_date: Some(start),
                end_date: request.session_end,
                city: None,
                state: None,
                venue: None,
            };
            Some(compute_derived_dates(&session, program, &price.attendance)?)
        }
        None => None,
    };

    Ok(QuoteReport {
        program: program.name.clone(),
        attendance: price.attendance,
        base_price: price.base_price,
        upgraded: price.upgraded,
        coupon,
        coupon_message,
        discount: discounted.discount,
        amount_due: discounted.amount_due,
        dates,
    })
}

impl fmt::Display for QuoteReport {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        writeln!(f, "Program:      {}", self.program)?;
        writeln!(f, "Attendance:   {}", self.attendance.attendance_type())?;
        writeln!(f, "Base price:   ${}", self.base_price)?;
        if self.upgraded {
            writeln!(f, "              (upgraded to the full program)")?;
        }
        match (&self.coupon, &self.coupon_message) {
            (Some(applied), _) => writeln!(f, "Coupon:       {}", applied.code)?,
            (None, Some(message)) => writeln!(f, "Coupon:       not applied ({message})")?,
            (None, None) => {}
        }
        writeln!(f, "Discount:     ${}", self.discount)?;
        write!(f, "Amount due:   ${}", self.amount_due)?;
        if let Some(dates) = &self.dates {
            write!(f, "\nDates:        {} to {}", dates.start, dates.end)?;
        }
        Ok(())
    }
}

// ====================
// code
// ====================

#[derive(Debug, Clone)]
pub struct CodeRequest {
    pub format: String,
    pub program: String,
    pub attendance: Attendance,
    pub city: Option<String>,
    pub start: Option<NaiveDate>,
}

/// Registration code for a hypothetical registration. With a start date the
/// block selection narrows it the same way the wizard does.
pub fn code(
    request: &CodeRequest,
    catalog: &ProgramCatalog,
    today: NaiveDate,
) -> Result<String> {
    let format = parse_format(&request.format)?;
    let program = catalog
        .resolve(&request.program)
        .ok_or_else(|| anyhow!("unknown program '{}'", request.program))?;
    let attendance = compute_amount_due(program, &request.attendance)?.attendance;

    let derived_start = match request.start {
        Some(start) => {
            let session = SessionRecord {
                id: "code".to_string(),
                program: Some(program.name.clone()),
                format: Some(format),
                start_date: Some(start),
                end_date: None,
                city: request.city.clone(),
                state: None,
                venue: None,
            };
            Some(compute_derived_dates(&session, program, &attendance)?.start)
        }
        None => None,
    };

    Ok(registration_code(
        format,
        program,
        &attendance,
        request.city.as_deref(),
        derived_start,
        today,
    ))
}

// ====================
// register
// ====================

/// Result of a scripted registration.
#[derive(Debug, Clone)]
pub struct RegisterReport {
    pub confirmation: Confirmation,
    pub coupon: Option<CouponOutcome>,
    pub steps: Vec<Step>,
}

/// Runs the whole wizard from recorded answers.
pub async fn register<G>(
    answers: &Answers,
    catalog: ProgramCatalog,
    gateway: &G,
    today: NaiveDate,
) -> Result<RegisterReport>
where
    G: RegistrationGateway + ?Sized,
{
    let mut wizard = Wizard::from_query(
        answers.query.as_deref().unwrap_or_default(),
        catalog,
        CouponValidator::standard(),
        today,
    )?;
    let steps = wizard.steps().to_vec();
    info!(steps = ?steps, "registration started");

    if let Some(raw) = answers.format.as_deref() {
        wizard.select_format(parse_format(raw)?)?;
    }
    if let Some(program) = answers.program.as_deref() {
        wizard.select_program(program)?;
    }
    match answers.blocks.as_deref() {
        Some(blocks) if !blocks.is_empty() => {
            wizard.select_blocks(blocks.iter().copied().map(BlockId))?;
        }
        Some(_) => {
            wizard.select_full()?;
        }
        None => {}
    }

    match answers.session.as_deref() {
        Some(id) => {
            let session = gateway
                .fetch_session(id)
                .await
                .with_context(|| format!("Failed to load session '{id}'"))?;
            wizard.select_session(session)?;
        }
        None if wizard.state().session_id.is_some() => {
            wizard.load_session(gateway).await?;
        }
        None => {}
    }

    wizard.set_contact(answers.contact.clone().into())?;
    if let Some(raw) = answers.payment_method.as_deref() {
        let method =
            PaymentMethod::parse(raw).ok_or_else(|| anyhow!("unknown payment method '{raw}'"))?;
        wizard.set_payment_method(method)?;
    }
    wizard.set_billing(answers.billing.clone().map(Into::into))?;

    let coupon = match answers.coupon.as_deref() {
        Some(code) => Some(wizard.apply_coupon(code, gateway).await?),
        None => None,
    };

    while wizard.current_step() != Step::Payment {
        wizard.advance()?;
    }

    let card = answers.card.clone().map(PaymentMethodToken);
    let confirmation = wizard.submit(gateway, card.as_ref()).await?;
    if !wizard.is_completed() {
        bail!("registration did not complete");
    }

    Ok(RegisterReport {
        confirmation,
        coupon,
        steps,
    })
}

impl fmt::Display for RegisterReport {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match &self.coupon {
            Some(CouponOutcome::Applied(applied)) => {
                writeln!(f, "Coupon:            {} (-${})", applied.code, applied.amount)?
            }
            Some(CouponOutcome::Rejected(rejection)) => {
                writeln!(f, "Coupon:            {rejection}")?
            }
            Some(CouponOutcome::Removed(code)) => writeln!(f, "Coupon:            {code} removed")?,
            None => {}
        }
        writeln!(f, "Registration code: {}", self.confirmation.registration_code)?;
        write!(f, "Amount due:        ${}", self.confirmation.amount_due)?;
        if let Some(id) = &self.confirmation.payment_intent_id {
            write!(f, "\nPayment:           {id}")?;
        }
        Ok(())
    }
}
