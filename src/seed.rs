//! Deterministic history seeder.
//!
//! Builds a plausible past for one vehicle: a fixed daily trip routine, a
//! nightly charge whose energy balances the day's consumption (with a
//! small jitter), and a 15-minute telemetry grid derived from the two.
//! Seeding replaces any existing history for the vin, so repeated runs
//! converge on the same row counts instead of piling up duplicates.
//!
//! The window covers exactly `days` whole UTC days ending at the current
//! midnight; the telemetry grid carries one extra sample to close the
//! final interval.

use chrono::{DateTime, Duration, NaiveTime, Timelike, Utc};
use rand::Rng;
use serde::Serialize;
use tracing::info;

use crate::config::CostModel;
use crate::error::Error;
use crate::mock::MockLocation;
use crate::storage::{ChargingEvent, Storage, TelemetryRecord, TripRecord};
use crate::vehicle::{BATTERY_CAPACITY_KWH, CHARGER_POWER_KW, FULL_RANGE_KM, WH_PER_KM};

const START_ODOMETER_KM: f64 = 300.0;
const CHARGE_START_HOUR: u32 = 1;
const CHARGE_END_HOUR: u32 = 5;
const SAMPLE_MINUTES: i64 = 15;
const SAMPLES_PER_DAY: u32 = 96;
const BATCH_SIZE: usize = 500;

/// The vehicle's daily routine: one-way km, departure hour, and round-trip
/// duration in minutes. Two Livorno runs and two Venturina runs, all round
/// trips anchored at home, so both endpoints record the home coordinates.
static DAILY_TRIPS: [(f64, u32, i64); 4] = [
    (55.0, 8, 90),
    (55.0, 12, 90),
    (20.0, 14, 45),
    (20.0, 16, 45),
];

#[derive(Debug, Clone)]
pub struct SeedOptions {
    pub vin: String,
    pub days: u32,
    pub price_per_kwh: f64,
}

impl SeedOptions {
    pub fn new(vin: impl Into<String>) -> Self {
        Self {
            vin: vin.into(),
            days: 30,
            price_per_kwh: CostModel::default().electricity_price_per_kwh,
        }
    }
}

/// Row counts and trip totals of a completed seeding run.
#[derive(Debug, Clone, Serialize)]
pub struct SeedSummary {
    pub vin: String,
    pub days: u32,
    pub trips_written: usize,
    pub charges_written: usize,
    pub telemetry_written: usize,
    pub total_trip_km: f64,
    pub total_trip_kwh: f64,
}

/// Replaces the vin's history with `days` of generated data.
pub async fn seed<S: Storage>(
    storage: &S,
    opts: &SeedOptions,
    now: DateTime<Utc>,
    rng: &mut (impl Rng + ?Sized),
) -> Result<SeedSummary, Error> {
    let window_end = now.date_naive().and_time(NaiveTime::MIN).and_utc();
    let window_start = window_end - Duration::days(i64::from(opts.days));

    let trips = build_trips(&opts.vin, window_start, opts.days);
    let total_trip_km: f64 = trips.iter().map(|t| t.km).sum();
    let total_trip_kwh: f64 = trips.iter().map(|t| t.kwh_consumed).sum();

    let charges = build_charges(opts, window_start, total_trip_kwh, rng);
    let telemetry = build_telemetry(&opts.vin, window_start, opts.days, &trips, &charges);

    storage.delete_vehicle_history(&opts.vin).await?;
    for chunk in trips.chunks(BATCH_SIZE) {
        storage.insert_trips(chunk).await?;
    }
    for chunk in charges.chunks(BATCH_SIZE) {
        storage.insert_charging_events(chunk).await?;
    }
    for chunk in telemetry.chunks(BATCH_SIZE) {
        storage.insert_telemetry(chunk).await?;
    }

    let summary = SeedSummary {
        vin: opts.vin.clone(),
        days: opts.days,
        trips_written: trips.len(),
        charges_written: charges.len(),
        telemetry_written: telemetry.len(),
        total_trip_km: round2(total_trip_km),
        total_trip_kwh: round2(total_trip_kwh),
    };
    info!(
        vin = %summary.vin,
        days = summary.days,
        trips = summary.trips_written,
        charges = summary.charges_written,
        telemetry = summary.telemetry_written,
        "seed complete"
    );
    Ok(summary)
}

/// The fixed routine, stamped onto each day of the window. Trips are
/// emitted in completion order, which the telemetry walk relies on.
fn build_trips(vin: &str, window_start: DateTime<Utc>, days: u32) -> Vec<TripRecord> {
    let (home_lat, home_lon) = MockLocation::SanVincenzo.coords();
    let mut trips = Vec::with_capacity(days as usize * DAILY_TRIPS.len());
    for day in 0..days {
        let day_start = window_start + Duration::days(i64::from(day));
        for (one_way_km, depart_hour, minutes) in DAILY_TRIPS {
            let started_at = day_start + Duration::hours(i64::from(depart_hour));
            let km = one_way_km * 2.0;
            trips.push(TripRecord {
                vin: vin.to_string(),
                started_at,
                ended_at: started_at + Duration::minutes(minutes),
                start_lat: home_lat,
                start_lon: home_lon,
                end_lat: home_lat,
                end_lon: home_lon,
                km,
                kwh_consumed: round2(km * WH_PER_KM / 1000.0),
            });
        }
    }
    trips
}

/// One closed nightly session per day, 01:00 to 05:00. Energy is the mean
/// daily trip consumption with a +-5% jitter; cost follows the configured
/// tariff.
fn build_charges(
    opts: &SeedOptions,
    window_start: DateTime<Utc>,
    total_trip_kwh: f64,
    rng: &mut (impl Rng + ?Sized),
) -> Vec<ChargingEvent> {
    let daily_kwh = total_trip_kwh / f64::from(opts.days.max(1));
    let mut charges = Vec::with_capacity(opts.days as usize);
    for day in 0..opts.days {
        let day_start = window_start + Duration::days(i64::from(day));
        let kwh_added = round2(daily_kwh * rng.gen_range(0.95..1.05));
        charges.push(ChargingEvent {
            vin: opts.vin.clone(),
            started_at: day_start + Duration::hours(i64::from(CHARGE_START_HOUR)),
            ended_at: Some(day_start + Duration::hours(i64::from(CHARGE_END_HOUR))),
            kwh_added,
            cost_eur: round2(kwh_added * opts.price_per_kwh),
        });
    }
    charges
}

/// Walks the 15-minute grid, folding in each trip and charge as its end
/// time passes. State of charge stays inside [20, 80]; the odometer is the
/// consumed energy converted back through the consumption constant, so it
/// advances by exactly the trip distance when a trip completes.
fn build_telemetry(
    vin: &str,
    window_start: DateTime<Utc>,
    days: u32,
    trips: &[TripRecord],
    charges: &[ChargingEvent],
) -> Vec<TelemetryRecord> {
    let (home_lat, home_lon) = MockLocation::SanVincenzo.coords();
    let samples = days * SAMPLES_PER_DAY;
    let mut telemetry = Vec::with_capacity(samples as usize + 1);

    let mut trip_idx = 0;
    let mut charge_idx = 0;
    let mut consumed_kwh = 0.0;
    let mut charged_kwh = 0.0;

    for i in 0..=samples {
        let t = window_start + Duration::minutes(i64::from(i) * SAMPLE_MINUTES);
        while trip_idx < trips.len() && trips[trip_idx].ended_at <= t {
            consumed_kwh += trips[trip_idx].kwh_consumed;
            trip_idx += 1;
        }
        while charge_idx < charges.len()
            && charges[charge_idx].ended_at.is_some_and(|ended| ended <= t)
        {
            charged_kwh += charges[charge_idx].kwh_added;
            charge_idx += 1;
        }

        let net_kwh = charged_kwh - consumed_kwh;
        let soc = (80.0 + net_kwh / BATTERY_CAPACITY_KWH * 100.0).round() as i32;
        let soc = soc.clamp(20, 80);
        let is_charging = (CHARGE_START_HOUR..CHARGE_END_HOUR).contains(&t.hour());

        telemetry.push(TelemetryRecord {
            vin: vin.to_string(),
            timestamp: t,
            soc,
            odometer_km: round1(START_ODOMETER_KM + consumed_kwh * 1000.0 / WH_PER_KM),
            range_km: round1(f64::from(soc) / 100.0 * FULL_RANGE_KM),
            is_charging,
            power_usage_kw: is_charging.then_some(CHARGER_POWER_KW),
            temp_inside_c: Some(22.0),
            lat: Some(home_lat),
            lon: Some(home_lon),
        });
    }
    telemetry
}

/// Telemetry columns carry one decimal; money and energy carry two.
fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
