//! Parsers for the textual arguments the CLI accepts.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use wsk_orders::ItemInput;
use wsk_schemas::{parse_amount, EntryKind, Micros, OrderStatus, PaymentMethod};

/// `"<description>:<quantity>:<unit price>"`.
///
/// Splits from the right, so the description may itself contain `:`.
/// An empty quantity takes the model default.
pub fn parse_item_spec(raw: &str) -> Result<ItemInput> {
    let mut parts = raw.rsplitn(3, ':');
    let price = parts.next().unwrap_or("");
    let qty = parts
        .next()
        .ok_or_else(|| anyhow!("invalid --item {raw:?}: expected <description>:<qty>:<price>"))?;
    let description = parts
        .next()
        .ok_or_else(|| anyhow!("invalid --item {raw:?}: expected <description>:<qty>:<price>"))?;

    let quantity = match qty.trim() {
        "" => None,
        q => Some(
            q.parse::<u32>()
                .with_context(|| format!("invalid --item {raw:?}: bad quantity {q:?}"))?,
        ),
    };
    let unit_price =
        parse_amount(price, "unit_price").with_context(|| format!("invalid --item {raw:?}"))?;

    Ok(ItemInput {
        description: description.trim().to_string(),
        quantity,
        unit_price,
        note: None,
    })
}

pub fn parse_money(raw: &str, field: &'static str) -> Result<Micros> {
    Ok(parse_amount(raw, field)?)
}

pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .with_context(|| format!("invalid date {raw:?}: expected YYYY-MM-DD"))
}

/// Midnight UTC at the start of `day`.
pub fn start_of_day(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_hms_opt(0, 0, 0).unwrap_or_default())
}

/// Noon UTC, so the entry lands on `day` in the daily totals.
pub fn midday(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_hms_opt(12, 0, 0).unwrap_or_default())
}

pub fn parse_status(raw: &str) -> Result<OrderStatus> {
    match OrderStatus::parse(raw) {
        Some(s) => Ok(s),
        None => bail!("invalid status {raw:?}: expected in_progress|ready|delivered"),
    }
}

pub fn parse_method(raw: &str) -> Result<PaymentMethod> {
    match PaymentMethod::parse(raw) {
        Some(m) => Ok(m),
        None => bail!("invalid payment method {raw:?}: expected pix|cash|card"),
    }
}

pub fn parse_kind(raw: &str) -> Result<EntryKind> {
    match EntryKind::parse(raw) {
        Some(k) => Ok(k),
        None => bail!("invalid entry kind {raw:?}: expected revenue|expense"),
    }
}
