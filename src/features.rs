//! Raw reading -> model input.
//!
//! The regressor binds columns by position, so `FeatureVector::to_array` is
//! the single source of truth for column order and `COLUMNS` must list the
//! same names in the same order as the training frame.

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};

use crate::error::PredictError;
use crate::types::PredictionRequest;

pub const FEATURE_COUNT: usize = 15;

pub const COLUMNS: [&str; FEATURE_COUNT] = [
    "PT08.S1(CO)",
    "NMHC(GT)",
    "C6H6(GT)",
    "PT08.S2(NMHC)",
    "NOx(GT)",
    "PT08.S3(NOx)",
    "NO2(GT)",
    "PT08.S4(NO2)",
    "PT08.S5(O3)",
    "T",
    "RH",
    "AH",
    "Hour",
    "Month",
    "DayOfWeek",
];

// Sensor channels the serving input never carries; training-time defaults.
pub const PT08_S1_CO: f64 = 1000.0;
pub const NMHC_GT: f64 = 100.0;
pub const C6H6_GT: f64 = 10.0;
pub const PT08_S2_NMHC: f64 = 900.0;
pub const PT08_S3_NOX: f64 = 1000.0;
pub const PT08_S4_NO2: f64 = 1000.0;

/// Crude AH approximation used at training time, not a physical formula.
pub const AH_FACTOR: f64 = 0.1;

// Serving clients send ISO dates; the raw dataset uses day-first dates and
// dotted times. Both describe the same calendar values.
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%d/%m/%Y"];
const TIME_FORMATS: [&str; 2] = ["%H:%M:%S", "%H.%M.%S"];

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub pt08_s1_co: f64,
    pub nmhc_gt: f64,
    pub c6h6_gt: f64,
    pub pt08_s2_nmhc: f64,
    pub nox_gt: f64,
    pub pt08_s3_nox: f64,
    pub no2_gt: f64,
    pub pt08_s4_no2: f64,
    pub pt08_s5_o3: f64,
    pub t: f64,
    pub rh: f64,
    pub ah: f64,
    pub hour: u32,
    pub month: u32,
    /// Monday = 0.
    pub day_of_week: u32,
}

impl FeatureVector {
    /// Values in `COLUMNS` order.
    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.pt08_s1_co,
            self.nmhc_gt,
            self.c6h6_gt,
            self.pt08_s2_nmhc,
            self.nox_gt,
            self.pt08_s3_nox,
            self.no2_gt,
            self.pt08_s4_no2,
            self.pt08_s5_o3,
            self.t,
            self.rh,
            self.ah,
            self.hour as f64,
            self.month as f64,
            self.day_of_week as f64,
        ]
    }

    pub fn named(&self) -> impl Iterator<Item = (&'static str, f64)> {
        COLUMNS.into_iter().zip(self.to_array())
    }
}

pub fn build_features(req: &PredictionRequest) -> Result<FeatureVector, PredictError> {
    let date = parse_date(&req.date)?;
    let time = parse_time(&req.time)?;

    // NaN fails the range check too.
    if !(0.0..=100.0).contains(&req.humidity) {
        return Err(PredictError::Validation {
            field: "humidity",
            value: req.humidity,
            min: 0.0,
            max: 100.0,
        });
    }

    Ok(FeatureVector {
        pt08_s1_co: PT08_S1_CO,
        nmhc_gt: NMHC_GT,
        c6h6_gt: C6H6_GT,
        pt08_s2_nmhc: PT08_S2_NMHC,
        nox_gt: req.nox,
        pt08_s3_nox: PT08_S3_NOX,
        no2_gt: req.no2,
        pt08_s4_no2: PT08_S4_NO2,
        pt08_s5_o3: req.o3,
        t: req.temperature,
        rh: req.humidity,
        ah: req.humidity * AH_FACTOR,
        hour: time.hour(),
        month: date.month(),
        day_of_week: date.weekday().num_days_from_monday(),
    })
}

fn parse_date(s: &str) -> Result<NaiveDate, PredictError> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s.trim(), fmt).ok())
        .ok_or_else(|| PredictError::InputParse {
            field: "date",
            value: s.to_string(),
            expected: "YYYY-MM-DD, DD/MM/YYYY",
        })
}

fn parse_time(s: &str) -> Result<NaiveTime, PredictError> {
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(s.trim(), fmt).ok())
        .ok_or_else(|| PredictError::InputParse {
            field: "time",
            value: s.to_string(),
            expected: "HH:MM:SS, HH.MM.SS",
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(date: &str, time: &str, humidity: f64) -> PredictionRequest {
        PredictionRequest {
            date: date.to_string(),
            time: time.to_string(),
            temperature: 25.0,
            humidity,
            nox: 120.0,
            no2: 80.0,
            o3: 100.0,
        }
    }

    #[test]
    fn reference_reading_builds_expected_vector() {
        let fv = build_features(&req("2024-02-21", "14:30:00", 60.0)).unwrap();
        let expected = [
            1000.0, 100.0, 10.0, 900.0, 120.0, 1000.0, 80.0, 1000.0, 100.0, 25.0, 60.0, 6.0,
            14.0, 2.0, 2.0,
        ];
        for (i, (got, want)) in fv.to_array().iter().zip(expected).enumerate() {
            assert!((got - want).abs() < 1e-9, "{}: got {} want {}", COLUMNS[i], got, want);
        }
    }

    #[test]
    fn placeholders_ignore_input() {
        let mut r = req("2023-07-01", "00:00:00", 0.0);
        r.nox = -5.0;
        r.no2 = 1e6;
        r.o3 = 0.0;
        r.temperature = -40.0;
        let a = build_features(&r).unwrap().to_array();
        assert_eq!(a[0], 1000.0);
        assert_eq!(a[1], 100.0);
        assert_eq!(a[2], 10.0);
        assert_eq!(a[3], 900.0);
        assert_eq!(a[5], 1000.0);
        assert_eq!(a[7], 1000.0);
    }

    #[test]
    fn ah_is_tenth_of_humidity() {
        for h in [0.0, 12.5, 33.3, 60.0, 99.9, 100.0] {
            let fv = build_features(&req("2024-02-21", "10:00:00", h)).unwrap();
            assert!((fv.ah - h * 0.1).abs() < 1e-12);
        }
    }

    #[test]
    fn weekday_is_monday_based() {
        // 2024-02-19 was a Monday
        let days: Vec<u32> = (19..=25)
            .map(|d| {
                build_features(&req(&format!("2024-02-{d}"), "08:00:00", 50.0))
                    .unwrap()
                    .day_of_week
            })
            .collect();
        assert_eq!(days, vec![0, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn training_and_serving_formats_agree() {
        let serving = build_features(&req("2024-02-21", "14:30:00", 60.0)).unwrap();
        let training = build_features(&req("21/02/2024", "14.30.00", 60.0)).unwrap();
        assert_eq!(serving, training);
    }

    #[test]
    fn bad_date_is_parse_error() {
        for d in ["2024-13-01", "21-02-2024", "", "yesterday"] {
            let err = build_features(&req(d, "14:30:00", 60.0)).unwrap_err();
            assert!(matches!(err, PredictError::InputParse { field: "date", .. }), "{d}");
        }
    }

    #[test]
    fn bad_time_is_parse_error() {
        for t in ["25:00:00", "14:30", "noon"] {
            let err = build_features(&req("2024-02-21", t, 60.0)).unwrap_err();
            assert!(matches!(err, PredictError::InputParse { field: "time", .. }), "{t}");
        }
    }

    #[test]
    fn humidity_out_of_range_is_rejected() {
        for h in [-0.1, 100.5, f64::NAN] {
            let err = build_features(&req("2024-02-21", "14:30:00", h)).unwrap_err();
            assert_eq!(err.kind(), "validation_error");
        }
    }

    #[test]
    fn named_follows_column_order() {
        let fv = build_features(&req("2024-02-21", "14:30:00", 60.0)).unwrap();
        let names: Vec<_> = fv.named().map(|(n, _)| n).collect();
        assert_eq!(names, COLUMNS.to_vec());
        assert_eq!(fv.named().last(), Some(("DayOfWeek", 2.0)));
    }
}
