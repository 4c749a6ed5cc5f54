//! Final report assembly.
//!
//! `StaticHtmlReport` writes one self-contained HTML page. Images are linked through the
//! renderer handles, series plots are embedded as JSON for a client-side plotting sink.
use std::fmt::Write as _;
use std::path::Path;

use super::error::ReportError;
use super::measurement::Measurement;
use super::timestamp::display;

pub trait ReportTemplater {
    /// Render the ordered measurement list into a report at `path`
    fn render(&self, title: &str, measurements: &[Measurement], path: &Path) -> Result<(), ReportError>;
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Plain HTML, no external template engine
#[derive(Debug, Clone, Default)]
pub struct StaticHtmlReport;

impl StaticHtmlReport {
    fn render_measurement(&self, html: &mut String, measurement: &Measurement) -> Result<(), ReportError> {
        let info = measurement.info();
        let _ = writeln!(
            html,
            "<section class=\"measurement\" id=\"{}\" data-kind=\"{}\">",
            escape(info.id()),
            measurement.ident()
        );
        match info.slide_num {
            Some(num) => {
                let _ = writeln!(html, "<h2><span class=\"slide\">{num}</span> {}</h2>", escape(info.id()));
            }
            None => {
                let _ = writeln!(html, "<h2>{}</h2>", escape(info.id()));
            }
        }
        let _ = writeln!(
            html,
            "<p class=\"meta\">{} | {} | {}</p>",
            measurement.ident(),
            display(&info.timestamp()),
            escape(&info.fileinfo.basename)
        );

        if let Measurement::Error(record) = measurement {
            let _ = writeln!(html, "<p class=\"error\">{}</p>", escape(&record.reason));
        }

        for handle in measurement.rendered_handles() {
            let _ = writeln!(
                html,
                "<img src=\"{}\" alt=\"{}\">",
                escape(handle),
                escape(info.id())
            );
        }

        for plot in measurement.series_plots() {
            let json = serde_json::to_string(plot)?;
            // Keep the payload from closing the script element
            let json = json.replace("</", "<\\/");
            let _ = writeln!(html, "<script type=\"application/json\" class=\"plot\">{json}</script>");
        }

        if let Some(metadata) = &info.labjournal {
            html.push_str("<table class=\"labjournal\">\n");
            for (key, value) in metadata {
                let _ = writeln!(
                    html,
                    "<tr><th>{}</th><td>{}</td></tr>",
                    escape(key),
                    escape(value)
                );
            }
            html.push_str("</table>\n");
        }
        html.push_str("</section>\n");
        Ok(())
    }

    pub fn to_html(&self, title: &str, measurements: &[Measurement]) -> Result<String, ReportError> {
        let mut html = String::new();
        let _ = writeln!(
            html,
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>",
            escape(title)
        );
        let _ = writeln!(html, "<h1>{}</h1>", escape(title));
        for measurement in measurements {
            self.render_measurement(&mut html, measurement)?;
        }
        html.push_str("</body>\n</html>\n");
        Ok(html)
    }
}

impl ReportTemplater for StaticHtmlReport {
    fn render(&self, title: &str, measurements: &[Measurement], path: &Path) -> Result<(), ReportError> {
        let html = self.to_html(title, measurements)?;
        std::fs::write(path, html)?;
        spdlog::info!("Wrote report with {} measurements to {path:?}", measurements.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fileinfo::Fileinfo;
    use crate::measurement::ErrorRecord;
    use crate::misc::qcmb::tests::QCMB_LOG;
    use crate::misc::qcmb::Qcmb;
    use crate::config::Config;
    use crate::render::PngRenderer;
    use time::macros::datetime;

    #[test]
    fn test_escape() {
        assert_eq!(escape("<a & 'b'>"), "&lt;a &amp; &#39;b&#39;&gt;");
    }

    #[test]
    fn test_report_contents() {
        let dir = tempfile::tempdir().unwrap();
        let mut renderer = PngRenderer::new(&dir.path().join("r_files")).unwrap();

        let info = Fileinfo::new(Path::new("/d/Au_deposition.log")).unwrap();
        let mut qcmb = Measurement::Qcmb(Qcmb::parse(QCMB_LOG, info, datetime!(2022-01-01 0:00)).unwrap());
        qcmb.process(&Config::default(), &mut renderer).unwrap();
        qcmb.set_labjournal(Some(vec![("Sample".to_string(), "Au <111>".to_string())]));

        let mut error = Measurement::Error(ErrorRecord::new(
            Fileinfo::new(Path::new("/d/aborted--2_1.Z_mtrx")).unwrap(),
            datetime!(2022-01-01 1:00),
            "no traces".to_string(),
        ));
        error.set_slide_num(1);

        let path = dir.path().join("r_report.html");
        StaticHtmlReport
            .render("Run 1", &[qcmb, error], &path)
            .unwrap();
        let html = std::fs::read_to_string(&path).unwrap();

        assert!(html.contains("<title>Run 1</title>"));
        assert!(html.contains("data-kind=\"QCMB\""));
        assert!(html.contains("class=\"plot\">{\"x_label\":\"Time / s\""));
        assert!(html.contains("<td>Au &lt;111&gt;</td>"));
        assert!(html.contains("<span class=\"slide\">1</span> aborted--2_1"));
        assert!(html.contains("<p class=\"error\">no traces</p>"));
        assert!(html.find("Au_deposition").unwrap() < html.find("aborted--2_1").unwrap());
    }
}
