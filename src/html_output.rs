//! HTML output format for RTT reports
//!
//! One self-contained document per run: the current matrix coloured by
//! verdict, alert lists, diagnostics and optionally the baseline matrix.
//! Inline styles only, since the document is mailed as is.

use crate::deviation::{Classification, DeviationThresholds};
use crate::machine::MachineId;
use crate::matrix::ProbeMatrix;
use crate::report::{describe_deviation, format_micros, DeviationRecord, RunReport};
use crate::sample::{ProbeCell, NOT_PROBED_TOKEN, UNAVAILABLE_TOKEN};

pub const NORMAL_COLOR: &str = "#C1FFC1";
pub const REGRESSED_COLOR: &str = "#FF0000";
pub const IMPROVED_COLOR: &str = "#33A1C9";
const HEADER_COLOR: &str = "#DBDBDB";

/// Who produced the report, and when
#[derive(Debug, Clone, PartialEq)]
pub struct ReportFooter {
    pub generated_at: String,
    pub user: String,
    pub host: String,
}

impl ReportFooter {
    /// Footer for the current process
    pub fn current() -> Self {
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string());
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());

        Self {
            generated_at: chrono::Local::now()
                .format("%d/%m/%Y at %H:%M:%S")
                .to_string(),
            user,
            host,
        }
    }
}

/// HTML output formatter
#[derive(Debug, Clone, Copy)]
pub struct HtmlOutput {
    zone_only: bool,
    include_reference: bool,
}

impl HtmlOutput {
    /// `zone_only` drops host names from headers; `include_reference`
    /// appends the baseline table
    pub fn new(zone_only: bool, include_reference: bool) -> Self {
        Self {
            zone_only,
            include_reference,
        }
    }

    /// Escape HTML special characters
    fn escape_html(text: &str) -> String {
        text.replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
            .replace('"', "&quot;")
            .replace('\'', "&#39;")
    }

    fn color(classification: Classification) -> &'static str {
        match classification {
            Classification::Normal => NORMAL_COLOR,
            Classification::Regressed => REGRESSED_COLOR,
            Classification::Improved => IMPROVED_COLOR,
        }
    }

    fn cell_text(cell: &ProbeCell) -> String {
        match cell {
            ProbeCell::NotProbed => NOT_PROBED_TOKEN.to_string(),
            ProbeCell::Measured(sample) => match sample.avg.value() {
                Some(avg) => format_micros(avg),
                None => UNAVAILABLE_TOKEN.to_string(),
            },
        }
    }

    fn header_cell(&self, machine: &MachineId) -> String {
        format!(
            "<td align=\"center\" style=\"background-color:{}\"><b>{}</b></td>",
            HEADER_COLOR,
            Self::escape_html(&machine.label(self.zone_only))
        )
    }

    /// Render a matrix; `classify` picks each cell's colour
    fn render_matrix<F>(&self, matrix: &ProbeMatrix, classify: F) -> String
    where
        F: Fn(&MachineId, &MachineId) -> Classification,
    {
        let targets = matrix.targets();
        let mut html = String::new();

        html.push_str(
            "    <table border=\"1\" cellspacing=\"0\" cellpadding=\"4\" style=\"width:100%\">\n",
        );
        html.push_str("        <tr><td align=\"center\">From / To</td>");
        for &target in &targets {
            html.push_str(&self.header_cell(target));
        }
        html.push_str("</tr>\n");

        for source in matrix.sources() {
            html.push_str("        <tr>");
            html.push_str(&self.header_cell(source));
            for &target in &targets {
                let Some(cell) = matrix.get(source, target) else {
                    html.push_str("<td></td>");
                    continue;
                };
                let classification = classify(source, target);
                let text = Self::escape_html(&Self::cell_text(cell));
                let text = if classification == Classification::Normal {
                    text
                } else {
                    format!("<b>{}</b>", text)
                };
                html.push_str(&format!(
                    "<td align=\"center\" style=\"background-color:{}\">{}</td>",
                    Self::color(classification),
                    text
                ));
            }
            html.push_str("</tr>\n");
        }

        html.push_str("    </table>\n");
        html
    }

    fn render_alert_list(title: &str, color: &str, records: &[DeviationRecord]) -> String {
        if records.is_empty() {
            return String::new();
        }
        let mut html = format!(
            "    <p><b><span style=\"color:{}\">{}:</span></b></p>\n    <ul>\n",
            color, title
        );
        for record in records {
            html.push_str(&format!(
                "        <li>{}</li>\n",
                Self::escape_html(&describe_deviation(record))
            ));
        }
        html.push_str("    </ul>\n");
        html
    }

    fn render_threshold_hint(thresholds: &DeviationThresholds) -> String {
        format!(
            "    <p><i>Since changes have been detected, you may want to reset the baseline \
             (-g option), or increase the deviation tolerances (current value : {} % or {} us)</i></p>\n",
            thresholds.percent, thresholds.micros
        )
    }

    fn render_diagnostics(diagnostics: &[String]) -> String {
        if diagnostics.is_empty() {
            return String::new();
        }
        let mut html = String::from("    <p><b>Errors:</b></p>\n    <ul>\n");
        for diagnostic in diagnostics {
            html.push_str(&format!(
                "        <li>{}</li>\n",
                Self::escape_html(diagnostic)
            ));
        }
        html.push_str("    </ul>\n");
        html
    }

    /// Generate complete HTML document
    pub fn to_html(&self, report: &RunReport, footer: &ReportFooter) -> String {
        let alerts = report.alerts();
        let mut html = String::new();

        html.push_str("<!DOCTYPE html>\n");
        html.push_str("<html lang=\"en\">\n");
        html.push_str("<head>\n");
        html.push_str("    <meta charset=\"UTF-8\">\n");
        html.push_str("    <title>Data center links round trip times</title>\n");
        html.push_str("</head>\n");
        html.push_str("<body style=\"font-family: sans-serif\">\n");

        html.push_str(&format!(
            "    <p><b>Latest average RTT on {} :</b></p>\n",
            Self::escape_html(&footer.generated_at)
        ));
        html.push_str(&self.render_matrix(&report.current, |s, t| {
            report.comparison.classification(s, t)
        }));

        html.push_str(&Self::render_alert_list(
            "Regressions",
            REGRESSED_COLOR,
            alerts.regressions(),
        ));
        html.push_str(&Self::render_alert_list(
            "Improvements",
            IMPROVED_COLOR,
            alerts.improvements(),
        ));
        if alerts.has_any_alert() {
            html.push_str(&Self::render_threshold_hint(&report.thresholds));
        }

        html.push_str("    <hr>\n");
        html.push_str(&Self::render_diagnostics(&report.diagnostics));

        if self.include_reference {
            html.push_str("    <p><b>Reference average RTT :</b></p>\n");
            html.push_str(
                &self.render_matrix(report.baseline.matrix(), |_, _| Classification::Normal),
            );
        }

        html.push_str(&format!(
            "    <p><i>Program was executed by {} from {}</i></p>\n",
            Self::escape_html(&footer.user),
            Self::escape_html(&footer.host)
        ));
        html.push_str("</body>\n");
        html.push_str("</html>\n");

        html
    }
}

/// Render `report` as a standalone HTML document
pub fn render_report(
    report: &RunReport,
    zone_only: bool,
    include_reference: bool,
    footer: &ReportFooter,
) -> String {
    HtmlOutput::new(zone_only, include_reference).to_html(report, footer)
}
