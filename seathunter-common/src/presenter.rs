//! Report formatting for terminals and file sinks

use crate::classifier::StationProfile;
use crate::coordinates::CoordinateTable;
use crate::reconcile::{CongestionReportRow, RiskLevel};
use crate::scoring::Recommendation;
use crate::Result;
use std::fmt::Write as _;
use std::io::Write;

/// Shown when no rule fired for a station
pub const NO_RATIONALE_HINT: &str =
    "특별한 특징이 없는 일반적인 역입니다. 하차 인원이 많은 칸을 노리세요.";

/// "12,345"
pub fn format_count(count: u64) -> String {
    let digits = count.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn risk_label(level: RiskLevel) -> &'static str {
    match level {
        RiskLevel::HighRisk => "HIGH RISK",
        RiskLevel::Normal => "normal",
    }
}

/// Multi-line text card for one recommendation
pub fn render_recommendation(rec: &Recommendation) -> String {
    let mut out = String::new();
    let targets: Vec<&str> = rec.target_tags.iter().map(|t| t.as_str()).collect();

    let _ = writeln!(out, "== {} ==", rec.station_name);
    if !rec.feature_list.is_empty() {
        let _ = writeln!(out, "Features:          {}", rec.feature_list.replace('|', ", "));
    }
    let _ = writeln!(out, "Who gets off:      {}", targets.join(", "));
    let _ = writeln!(out, "Expected alighting: {}", format_count(rec.off_board_volume));
    let _ = writeln!(out, "Best car:          {} (score {})", rec.best_car, rec.score);

    let scores: Vec<String> = rec
        .per_car_scores
        .iter()
        .map(|(car, score)| format!("{}:{}", car, score))
        .collect();
    let _ = writeln!(out, "Scores:            {}", scores.join(" "));

    let _ = writeln!(out, "Tips:");
    if rec.rationale.is_empty() {
        let _ = writeln!(out, "  - {}", NO_RATIONALE_HINT);
    }
    for message in &rec.rationale {
        let _ = writeln!(out, "  - {}", message);
    }
    out
}

/// Fixed-width table of the top `limit` report rows
pub fn render_congestion_table(rows: &[CongestionReportRow], limit: usize) -> String {
    let shown = &rows[..rows.len().min(limit)];
    let station_width = shown
        .iter()
        .map(|r| r.station_name.chars().count())
        .max()
        .unwrap_or(0)
        .max("Station".len());
    let line_width = shown
        .iter()
        .map(|r| r.train_line.chars().count())
        .max()
        .unwrap_or(0)
        .max("Line".len());

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<sw$}  {:<lw$}  {:>10}  {:<9}  Status",
        "Station",
        "Line",
        "Expected",
        "Risk",
        sw = station_width,
        lw = line_width
    );
    for row in shown {
        let _ = writeln!(
            out,
            "{:<sw$}  {:<lw$}  {:>10}  {:<9}  {}",
            row.station_name,
            row.train_line,
            format_count(row.expected_alighting_count),
            risk_label(row.risk_level),
            row.status_message,
            sw = station_width,
            lw = line_width
        );
    }
    if rows.len() > shown.len() {
        let _ = writeln!(out, "... {} more rows", rows.len() - shown.len());
    }
    out
}

/// Write the congestion report as CSV with a header row
///
/// Latitude and longitude are left empty for stations missing from
/// `coordinates`.
pub fn write_congestion_csv<W: Write>(
    rows: &[CongestionReportRow],
    coordinates: &CoordinateTable,
    writer: W,
) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record([
        "station_name",
        "train_line",
        "status_message",
        "expected_alighting_count",
        "risk_level",
        "latitude",
        "longitude",
    ])?;
    for row in rows {
        let (latitude, longitude) = coordinates
            .get(&row.station_name)
            .map(|c| (c.latitude.to_string(), c.longitude.to_string()))
            .unwrap_or_default();
        csv_writer.write_record([
            row.station_name.as_str(),
            row.train_line.as_str(),
            row.status_message.as_str(),
            &row.expected_alighting_count.to_string(),
            row.risk_level.as_str(),
            &latitude,
            &longitude,
        ])?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Write the station-feature dataset as CSV with a header row
pub fn write_profiles_csv<W: Write>(profiles: &[StationProfile], writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(["station_name", "feature_list", "target_list"])?;
    for profile in profiles {
        csv_writer.write_record([
            profile.station_name.as_str(),
            &profile.feature_list(),
            &profile.target_list(),
        ])?;
    }
    csv_writer.flush()?;
    Ok(())
}
