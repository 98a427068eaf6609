//! Self-contained HTML rendering of a [`Report`].
//!
//! Charts are inline SVG, styles are inline CSS, and the report data is embedded as
//! JSON in `<script type="application/json" id="report-data">`. Nothing is loaded
//! from the network, so the file opens in any browser on its own.

use super::{ChartKind, Report, ReportFragment, ReportSection};
use std::fmt::Write;

const WIDTH: f64 = 640.0;
const HEIGHT: f64 = 320.0;
const MARGIN: f64 = 48.0;
const PALETTE: [&str; 8] = [
    "#4e79a7", "#f28e2b", "#e15759", "#76b7b2", "#59a14f", "#edc948", "#b07aa1", "#9c755f",
];

const STYLE: &str = "body{font-family:system-ui,sans-serif;margin:2rem;color:#222;background:#fafafa}\
h1{margin-bottom:.2rem}section{background:#fff;border:1px solid #ddd;border-radius:6px;padding:1rem;margin:1.5rem 0}\
.charts{display:flex;flex-wrap:wrap;gap:1rem}figure{margin:0}figcaption{font-weight:600;margin-bottom:.3rem}\
table.status{border-collapse:collapse}table.status td,table.status th{border:1px solid #ccc;padding:.3rem .6rem}\
.failed{color:#b00020}.note{color:#666;font-style:italic}svg text{font-size:11px}";

/// Render the whole report.
#[must_use]
pub fn render(report: &Report) -> String {
    let mut out = String::new();
    let _ = write!(
        out,
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n<h1>{}</h1>\n<p>Generated {}</p>\n",
        escape(&report.title),
        escape(&report.title),
        escape(&report.generated_at)
    );
    status_table(&mut out, &report.sections);
    for section in &report.sections {
        render_section(&mut out, section);
    }
    let json = serde_json::to_string(&report.to_json()).unwrap_or_else(|_| "null".to_string());
    let _ = write!(
        out,
        "<script type=\"application/json\" id=\"report-data\">{}</script>\n</body>\n</html>\n",
        json.replace("</", "<\\/")
    );
    out
}

fn status_table(out: &mut String, sections: &[ReportSection]) {
    out.push_str("<table class=\"status\">\n<tr><th>Event type</th><th>Status</th><th>Rows</th><th>Error</th></tr>\n");
    for s in sections {
        let class = if s.error.is_some() { " class=\"failed\"" } else { "" };
        let _ = writeln!(
            out,
            "<tr{class}><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape(&s.event_type),
            escape(&s.status),
            s.rows.map(|r| r.to_string()).unwrap_or_default(),
            escape(s.error.as_deref().unwrap_or(""))
        );
    }
    out.push_str("</table>\n");
}

fn render_section(out: &mut String, section: &ReportSection) {
    let _ = writeln!(
        out,
        "<section id=\"{}\">\n<h2>{} <small>({})</small></h2>",
        escape(&section.event_type),
        escape(&section.event_type),
        escape(&section.action)
    );
    if let Some(err) = &section.error {
        let _ = writeln!(out, "<p class=\"failed\">{}</p>", escape(err));
    }
    out.push_str("<div class=\"charts\">\n");
    for f in &section.fragments {
        let _ = writeln!(out, "<figure>\n<figcaption>{}</figcaption>", escape(&f.title));
        if let Some(note) = &f.note {
            let _ = writeln!(out, "<p class=\"note\">{}</p>", escape(note));
        } else if f.is_empty() {
            out.push_str("<p class=\"note\">No data.</p>\n");
        } else {
            out.push_str(&chart_svg(f));
        }
        out.push_str("</figure>\n");
    }
    out.push_str("</div>\n</section>\n");
}

/// SVG for one non-empty fragment.
#[must_use]
pub fn chart_svg(f: &ReportFragment) -> String {
    let mut svg = format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{WIDTH}\" height=\"{HEIGHT}\" viewBox=\"0 0 {WIDTH} {HEIGHT}\">\n"
    );
    match f.kind {
        ChartKind::Bar => columns(&mut svg, f, 0.15),
        ChartKind::Histogram => columns(&mut svg, f, 0.0),
        ChartKind::HorizontalBar => rows(&mut svg, f),
        ChartKind::Pie => pie(&mut svg, f),
        ChartKind::Indicator => indicator(&mut svg, f),
    }
    axis_labels(&mut svg, f);
    svg.push_str("</svg>\n");
    svg
}

fn max_value(f: &ReportFragment) -> f64 {
    let m = f.values.iter().copied().fold(0.0_f64, f64::max);
    if m > 0.0 { m } else { 1.0 }
}

#[allow(clippy::cast_precision_loss)]
fn columns(svg: &mut String, f: &ReportFragment, gap: f64) {
    let plot_w = WIDTH - 2.0 * MARGIN;
    let plot_h = HEIGHT - 2.0 * MARGIN;
    let slot = plot_w / f.values.len() as f64;
    let max = max_value(f);
    let _ = writeln!(
        svg,
        "<line x1=\"{MARGIN}\" y1=\"{}\" x2=\"{}\" y2=\"{}\" stroke=\"#888\"/>",
        HEIGHT - MARGIN,
        WIDTH - MARGIN,
        HEIGHT - MARGIN
    );
    let label_every = (f.values.len() / 10).max(1);
    for (i, (label, v)) in f.labels.iter().zip(&f.values).enumerate() {
        let h = v / max * plot_h;
        let x = MARGIN + slot * i as f64 + slot * gap / 2.0;
        let y = HEIGHT - MARGIN - h;
        let _ = writeln!(
            svg,
            "<rect x=\"{x:.1}\" y=\"{y:.1}\" width=\"{:.1}\" height=\"{h:.1}\" fill=\"{}\"><title>{}: {}</title></rect>",
            slot * (1.0 - gap),
            PALETTE[0],
            escape(label),
            number(*v)
        );
        if i % label_every == 0 {
            let _ = writeln!(
                svg,
                "<text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"middle\">{}</text>",
                x + slot * (1.0 - gap) / 2.0,
                HEIGHT - MARGIN + 14.0,
                escape(&truncate(label, 14))
            );
        }
    }
    let _ = writeln!(
        svg,
        "<text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"end\">{}</text>",
        MARGIN - 4.0,
        MARGIN + 4.0,
        number(max)
    );
}

#[allow(clippy::cast_precision_loss)]
fn rows(svg: &mut String, f: &ReportFragment) {
    let left = MARGIN * 2.5;
    let plot_w = WIDTH - left - MARGIN;
    let slot = (HEIGHT - 2.0 * MARGIN) / f.values.len() as f64;
    let max = max_value(f);
    for (i, (label, v)) in f.labels.iter().zip(&f.values).enumerate() {
        let y = MARGIN + slot * i as f64;
        let w = v / max * plot_w;
        let _ = writeln!(
            svg,
            "<text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"end\">{}</text>\n<rect x=\"{left:.1}\" y=\"{:.1}\" width=\"{w:.1}\" height=\"{:.1}\" fill=\"{}\"/>\n<text x=\"{:.1}\" y=\"{:.1}\">{}</text>",
            left - 4.0,
            y + slot * 0.6,
            escape(&truncate(label, 20)),
            y + slot * 0.1,
            slot * 0.8,
            PALETTE[1],
            left + w + 4.0,
            y + slot * 0.6,
            number(*v)
        );
    }
}

fn pie(svg: &mut String, f: &ReportFragment) {
    let total: f64 = f.values.iter().filter(|v| **v > 0.0).sum();
    if total <= 0.0 {
        return;
    }
    let (cx, cy, r) = (HEIGHT / 2.0, HEIGHT / 2.0, HEIGHT / 2.0 - 16.0);
    let mut angle = -std::f64::consts::FRAC_PI_2;
    for (i, (label, v)) in f.labels.iter().zip(&f.values).enumerate() {
        if *v <= 0.0 {
            continue;
        }
        let color = PALETTE[i % PALETTE.len()];
        let share = v / total;
        if share >= 1.0 {
            let _ = writeln!(svg, "<circle cx=\"{cx}\" cy=\"{cy}\" r=\"{r}\" fill=\"{color}\"/>");
        } else {
            let end = angle + share * std::f64::consts::TAU;
            let large = i32::from(share > 0.5);
            let _ = writeln!(
                svg,
                "<path d=\"M{cx:.1},{cy:.1} L{:.1},{:.1} A{r:.1},{r:.1} 0 {large} 1 {:.1},{:.1} Z\" fill=\"{color}\"><title>{}: {}</title></path>",
                cx + r * angle.cos(),
                cy + r * angle.sin(),
                cx + r * end.cos(),
                cy + r * end.sin(),
                escape(label),
                number(*v)
            );
            angle = end;
        }
        let ly = 24.0 + 18.0 * f64::from(u32::try_from(i).unwrap_or(u32::MAX).min(14));
        let _ = writeln!(
            svg,
            "<rect x=\"{:.1}\" y=\"{:.1}\" width=\"12\" height=\"12\" fill=\"{color}\"/><text x=\"{:.1}\" y=\"{:.1}\">{} ({:.1}%)</text>",
            HEIGHT + 20.0,
            ly - 10.0,
            HEIGHT + 38.0,
            ly,
            escape(label),
            share * 100.0
        );
    }
}

fn indicator(svg: &mut String, f: &ReportFragment) {
    let value = f.values.first().copied().unwrap_or_default();
    let _ = writeln!(
        svg,
        "<text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"middle\" style=\"font-size:56px;font-weight:700\">{}</text>",
        WIDTH / 2.0,
        HEIGHT / 2.0,
        number(value)
    );
}

fn axis_labels(svg: &mut String, f: &ReportFragment) {
    if !f.x_label.is_empty() {
        let _ = writeln!(
            svg,
            "<text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"middle\">{}</text>",
            WIDTH / 2.0,
            HEIGHT - 8.0,
            escape(&f.x_label)
        );
    }
    if !f.y_label.is_empty() {
        let _ = writeln!(
            svg,
            "<text x=\"14\" y=\"{:.1}\" text-anchor=\"middle\" transform=\"rotate(-90 14 {:.1})\">{}</text>",
            HEIGHT / 2.0,
            HEIGHT / 2.0,
            escape(&f.y_label)
        );
    }
}

fn number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{v:.0}")
    } else {
        format!("{v:.2}")
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut t: String = s.chars().take(max.saturating_sub(1)).collect();
        t.push('…');
        t
    }
}

/// Minimal HTML text/attribute escaping.
#[must_use]
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(kind: ChartKind) -> ReportFragment {
        ReportFragment {
            chart_id: "c".into(),
            title: "Deaths <by> cause".into(),
            kind,
            x_label: "cause".into(),
            y_label: "count".into(),
            labels: vec!["PvP".into(), "Fire".into()],
            values: vec![3.0, 1.0],
            note: None,
        }
    }

    fn report() -> Report {
        Report {
            title: "Training data".into(),
            generated_at: "2026-01-01T00:00:00Z".into(),
            sections: vec![
                ReportSection {
                    event_type: "deaths".into(),
                    action: "PLAYER_DEATH".into(),
                    status: "REPORTED".into(),
                    rows: Some(4),
                    error: None,
                    fragments: vec![fragment(ChartKind::Pie), fragment(ChartKind::Bar)],
                },
                ReportSection {
                    event_type: "economy".into(),
                    action: "GTS_TRANSACTION".into(),
                    status: "FAILED(extract)".into(),
                    rows: None,
                    error: Some("network error: </script>".into()),
                    fragments: Vec::new(),
                },
            ],
        }
    }

    #[test]
    fn html_is_self_contained() {
        let html = render(&report());
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<svg"));
        assert!(html.contains("id=\"report-data\""));
        assert!(!html.contains("src=\"http"));
        assert!(!html.contains("<link"));
    }

    #[test]
    fn text_is_escaped_everywhere() {
        let html = render(&report());
        assert!(html.contains("Deaths &lt;by&gt; cause"));
        assert_eq!(html.matches("</script>").count(), 1);
    }

    #[test]
    fn every_kind_renders() {
        for kind in [
            ChartKind::Bar,
            ChartKind::HorizontalBar,
            ChartKind::Histogram,
            ChartKind::Pie,
            ChartKind::Indicator,
        ] {
            let svg = chart_svg(&fragment(kind));
            assert!(svg.starts_with("<svg") && svg.ends_with("</svg>\n"), "{kind:?}");
        }
    }
}
