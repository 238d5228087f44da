//! Derived dashboard metrics.
//!
//! Everything here is read-only over storage and error-tolerant: a failed
//! read logs a warning and reports zeros or an empty series, so one bad
//! table never blanks the whole dashboard.

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::config::CostModel;
use crate::storage::{ChargingEvent, Storage, TelemetryRecord};
use crate::vehicle::WH_PER_KM;

/// Charging energy and spend for the calendar month containing `now`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonthlySummary {
    pub total_eur: f64,
    pub total_kwh: f64,
    pub event_count: usize,
}

/// One week of the savings comparison: what charging cost versus what the
/// same distance would have cost on fuel.
#[derive(Debug, Clone, Serialize)]
pub struct WeeklySavings {
    pub week_start: DateTime<Utc>,
    pub km: f64,
    pub spent_eur: f64,
    pub fuel_cost_eur: f64,
    pub saved_eur: f64,
}

/// Telemetry trimmed down to what the charts plot.
#[derive(Debug, Clone, Serialize)]
pub struct SeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub soc: i32,
    pub odometer_km: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardReport {
    pub vin: String,
    pub latest: Option<TelemetryRecord>,
    pub series: Vec<SeriesPoint>,
    pub monthly: MonthlySummary,
    pub monthly_fuel_equivalent_eur: f64,
    pub monthly_savings_eur: f64,
    pub weekly: Vec<WeeklySavings>,
    pub open_session: Option<ChargingEvent>,
}

/// Sums charging events whose start falls in the current calendar month.
pub async fn monthly_charging_cost<S: Storage>(
    storage: &S,
    vin: &str,
    now: DateTime<Utc>,
) -> MonthlySummary {
    let month_start = now
        .date_naive()
        .with_day(1)
        .unwrap_or_else(|| now.date_naive())
        .and_time(NaiveTime::MIN)
        .and_utc();

    let events = match storage.charging_events_since(vin, month_start).await {
        Ok(events) => events,
        Err(err) => {
            warn!(error = %err, "monthly cost read failed, reporting zeros");
            return MonthlySummary::default();
        }
    };

    let mut summary = MonthlySummary {
        event_count: events.len(),
        ..Default::default()
    };
    for event in events {
        summary.total_eur += event.cost_eur;
        summary.total_kwh += event.kwh_added;
    }
    summary.total_eur = round2(summary.total_eur);
    summary.total_kwh = round2(summary.total_kwh);
    summary
}

/// What the energy would have cost as fuel. Converts kWh back to km
/// through the consumption constant, then prices that distance at the
/// configured fuel economy and price.
pub fn fuel_equivalent_cost(total_kwh: f64, cost: &CostModel) -> f64 {
    let km = total_kwh * (1000.0 / WH_PER_KM);
    round2(km / cost.fuel_km_per_liter * cost.fuel_price_per_liter)
}

/// Per-week distance, charging spend, and fuel comparison for the last
/// `weeks` weeks, oldest first. The newest bucket is the running week that
/// includes today. Trips bucket by completion, charges by start.
pub async fn weekly_savings<S: Storage>(
    storage: &S,
    vin: &str,
    now: DateTime<Utc>,
    weeks: usize,
    cost: &CostModel,
) -> Vec<WeeklySavings> {
    let tomorrow = now.date_naive().and_time(NaiveTime::MIN).and_utc() + Duration::days(1);
    let window_start = tomorrow - Duration::weeks(weeks as i64);

    let mut buckets: Vec<WeeklySavings> = (0..weeks)
        .map(|i| WeeklySavings {
            week_start: window_start + Duration::weeks(i as i64),
            km: 0.0,
            spent_eur: 0.0,
            fuel_cost_eur: 0.0,
            saved_eur: 0.0,
        })
        .collect();

    let bucket_index = |t: DateTime<Utc>| -> Option<usize> {
        let days = (t - window_start).num_days();
        if days < 0 {
            return None;
        }
        let index = (days / 7) as usize;
        (index < weeks).then_some(index)
    };

    match storage.trips_since(vin, window_start).await {
        Ok(trips) => {
            for trip in trips {
                if let Some(i) = bucket_index(trip.ended_at) {
                    buckets[i].km += trip.km;
                }
            }
        }
        Err(err) => warn!(error = %err, "weekly trip read failed, reporting zeros"),
    }
    match storage.charging_events_since(vin, window_start).await {
        Ok(events) => {
            for event in events {
                if let Some(i) = bucket_index(event.started_at) {
                    buckets[i].spent_eur += event.cost_eur;
                }
            }
        }
        Err(err) => warn!(error = %err, "weekly charge read failed, reporting zeros"),
    }

    for bucket in &mut buckets {
        bucket.km = round2(bucket.km);
        bucket.spent_eur = round2(bucket.spent_eur);
        bucket.fuel_cost_eur =
            round2(bucket.km / cost.fuel_km_per_liter * cost.fuel_price_per_liter);
        bucket.saved_eur = round2(bucket.fuel_cost_eur - bucket.spent_eur);
    }
    buckets
}

pub async fn latest_sample<S: Storage>(storage: &S, vin: &str) -> Option<TelemetryRecord> {
    match storage.latest_telemetry(vin).await {
        Ok(latest) => latest,
        Err(err) => {
            warn!(error = %err, "latest telemetry read failed");
            None
        }
    }
}

/// Chart series covering the last `days` days.
pub async fn telemetry_series<S: Storage>(
    storage: &S,
    vin: &str,
    days: u32,
    now: DateTime<Utc>,
) -> Vec<SeriesPoint> {
    let since = now - Duration::days(i64::from(days));
    match storage.telemetry_since(vin, since).await {
        Ok(rows) => rows
            .into_iter()
            .map(|row| SeriesPoint {
                timestamp: row.timestamp,
                soc: row.soc,
                odometer_km: row.odometer_km,
            })
            .collect(),
        Err(err) => {
            warn!(error = %err, "telemetry series read failed, reporting empty");
            Vec::new()
        }
    }
}

/// The still-running charging session, if the newest one is open.
pub async fn open_charging_session<S: Storage>(storage: &S, vin: &str) -> Option<ChargingEvent> {
    match storage.latest_charging_event(vin).await {
        Ok(latest) => latest.filter(ChargingEvent::is_open),
        Err(err) => {
            warn!(error = %err, "charging session read failed");
            None
        }
    }
}

/// Assembles the full dashboard payload for one vehicle.
pub async fn dashboard_report<S: Storage>(
    storage: &S,
    vin: &str,
    now: DateTime<Utc>,
    weeks: usize,
    series_days: u32,
    cost: &CostModel,
) -> DashboardReport {
    let monthly = monthly_charging_cost(storage, vin, now).await;
    let monthly_fuel_equivalent_eur = fuel_equivalent_cost(monthly.total_kwh, cost);
    let monthly_savings_eur = round2(monthly_fuel_equivalent_eur - monthly.total_eur);

    DashboardReport {
        vin: vin.to_string(),
        latest: latest_sample(storage, vin).await,
        series: telemetry_series(storage, vin, series_days, now).await,
        monthly,
        monthly_fuel_equivalent_eur,
        monthly_savings_eur,
        weekly: weekly_savings(storage, vin, now, weeks, cost).await,
        open_session: open_charging_session(storage, vin).await,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
