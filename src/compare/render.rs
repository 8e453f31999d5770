//! Static HTML report. Self-contained: one document with an embedded stylesheet.
use super::ComparisonStats;

const CARD_COLORS: [&str; 6] = [
    "#3b82f6", "#10b981", "#f59e0b", "#ef4444", "#8b5cf6", "#ec4899",
];

const STYLE: &str = r#"  *, *::before, *::after { box-sizing: border-box; }
  body { font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, Helvetica, Arial, sans-serif;
         margin: 0; padding: 2rem; background: #f8fafc; color: #1e293b; line-height: 1.6; }
  h1 { margin: 0 0 .25rem; font-size: 1.8rem; }
  .subtitle { color: #64748b; margin-bottom: 2rem; }
  h2 { margin: 2.5rem 0 1rem; font-size: 1.3rem; border-bottom: 2px solid #e2e8f0; padding-bottom: .4rem; }
  .cards { display: flex; gap: 1rem; flex-wrap: wrap; margin-bottom: 1.5rem; }
  .card { border-radius: 10px; padding: 1.25rem 1.5rem; color: #fff; min-width: 200px; flex: 1; }
  .card .label { font-size: .85rem; opacity: .85; margin-bottom: .25rem; }
  .card .big { font-size: 2rem; font-weight: 700; }
  .card .detail { font-size: .8rem; opacity: .8; margin-top: .35rem; }
  table { border-collapse: collapse; width: 100%; margin-bottom: 1.5rem; background: #fff;
          border-radius: 8px; overflow: hidden; box-shadow: 0 1px 3px rgba(0,0,0,.08); }
  th, td { padding: .65rem 1rem; text-align: left; }
  th { background: #f1f5f9; font-weight: 600; font-size: .85rem; color: #475569; text-transform: uppercase; }
  tr:nth-child(even) td { background: #f8fafc; }
  td { font-size: .9rem; border-top: 1px solid #e2e8f0; }
  .num { text-align: right; font-variant-numeric: tabular-nums; }
  .tag { display: inline-block; background: #e2e8f0; color: #334155; border-radius: 4px;
         padding: .15rem .45rem; font-size: .78rem; margin: .15rem .2rem .15rem 0; }
  .overview-grid { display: grid; grid-template-columns: repeat(auto-fit, minmax(160px, 1fr)); gap: 1rem; }
  .overview-box { background: #fff; border-radius: 8px; padding: 1rem 1.25rem; text-align: center;
                  box-shadow: 0 1px 3px rgba(0,0,0,.08); }
  .overview-box .big { font-size: 1.6rem; font-weight: 700; }
  .overview-box .label { font-size: .8rem; color: #64748b; }
"#;

pub(crate) fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(ch),
        }
    }
    out
}

/// `meanings_openai_false_positive` -> `Openai False Positive`.
pub(crate) fn friendly_name(column: &str) -> String {
    column
        .strip_prefix(crate::config::COLUMN_PREFIX)
        .unwrap_or(column)
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// `12345` -> `12,345`.
pub(crate) fn group_thousands(value: usize) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn column_label(column: &str) -> String {
    escape_html(&friendly_name(column))
}

pub fn render_html(stats: &ComparisonStats) -> String {
    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    out.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    out.push_str("<title>Meanings Comparison Report</title>\n<style>\n");
    out.push_str(STYLE);
    out.push_str("</style>\n</head>\n<body>\n<h1>Meanings Comparison Report</h1>\n");
    out.push_str(&format!(
        "<p class=\"subtitle\">{} codes &middot; {} meaning columns</p>\n",
        group_thousands(stats.total),
        stats.columns.len()
    ));

    out.push_str("<h2>Per-Column Summary</h2>\n<div class=\"cards\">\n");
    for (index, column) in stats.per_column.iter().enumerate() {
        let color = CARD_COLORS[index % CARD_COLORS.len()];
        out.push_str(&format!(
            "<div class=\"card\" style=\"background:{color}\">\n  <div class=\"label\">{}</div>\n  <div class=\"big\">{}</div>\n",
            column_label(&column.column),
            group_thousands(column.count)
        ));
        out.push_str(&format!(
            "  <div class=\"detail\">{:.1}% of codes &middot; {} total meanings</div>\n",
            column.pct,
            group_thousands(column.total_meanings)
        ));
        out.push_str(&format!(
            "  <div class=\"detail\">avg {:.1} &middot; min {} &middot; max {} per code</div>\n</div>\n",
            column.avg, column.min, column.max
        ));
    }
    out.push_str("</div>\n");

    let overlap = &stats.overlap;
    out.push_str("<h2>Overall Overlap</h2>\n<div class=\"overview-grid\">\n");
    for (label, count, pct) in [
        ("In Any Column", overlap.any, overlap.any_pct),
        ("In All Columns", overlap.all, overlap.all_pct),
        ("No Meanings", overlap.none, overlap.none_pct),
    ] {
        out.push_str(&format!(
            "<div class=\"overview-box\">\n  <div class=\"big\">{}</div>\n  <div class=\"label\">{label} ({pct:.1}%)</div>\n</div>\n",
            group_thousands(count)
        ));
    }
    out.push_str("</div>\n");

    if !stats.pairwise.is_empty() {
        out.push_str("<h2>Pairwise Overlap</h2>\n<table>\n<tr><th>Column A</th><th>Column B</th>");
        out.push_str("<th class=\"num\">Both</th><th class=\"num\">Only A</th>");
        out.push_str("<th class=\"num\">Only B</th><th class=\"num\">Jaccard</th></tr>\n");
        for pair in &stats.pairwise {
            out.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td class=\"num\">{}</td><td class=\"num\">{}</td><td class=\"num\">{}</td><td class=\"num\">{:.3}</td></tr>\n",
                column_label(&pair.a),
                column_label(&pair.b),
                group_thousands(pair.both),
                group_thousands(pair.only_a),
                group_thousands(pair.only_b),
                pair.jaccard
            ));
        }
        out.push_str("</table>\n");
    }

    if !stats.agreement.is_empty() {
        out.push_str("<h2>Agreement Analysis</h2>\n");
        out.push_str("<p>For codes present in both columns, how often they share at least one ");
        out.push_str("normalized meaning.</p>\n");
        out.push_str("<table>\n<tr><th>Column A</th><th>Column B</th>");
        out.push_str("<th class=\"num\">Shared Codes</th><th class=\"num\">Agree</th>");
        out.push_str("<th class=\"num\">Rate</th></tr>\n");
        for pair in &stats.agreement {
            out.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td class=\"num\">{}</td><td class=\"num\">{}</td><td class=\"num\">{:.1}%</td></tr>\n",
                column_label(&pair.a),
                column_label(&pair.b),
                group_thousands(pair.shared_codes),
                group_thousands(pair.agree_count),
                pair.agree_pct
            ));
        }
        out.push_str("</table>\n");
    }

    if !stats.top_codes.is_empty() {
        out.push_str(&format!(
            "<h2>Top {} Codes by Distinct Meanings</h2>\n<table>\n<tr><th>Code</th><th class=\"num\">Distinct</th>",
            super::TOP_CODES_LIMIT
        ));
        for column in &stats.columns {
            out.push_str(&format!("<th>{}</th>", column_label(column)));
        }
        out.push_str("</tr>\n");
        for top in &stats.top_codes {
            out.push_str(&format!(
                "<tr><td><strong>{}</strong></td><td class=\"num\">{}</td>",
                escape_html(&top.code),
                top.distinct
            ));
            for column in &stats.columns {
                let tags: String = top
                    .meanings
                    .get(column)
                    .map(|meanings| {
                        meanings
                            .iter()
                            .map(|m| format!("<span class=\"tag\">{}</span>", escape_html(m)))
                            .collect()
                    })
                    .unwrap_or_default();
                if tags.is_empty() {
                    out.push_str("<td>&mdash;</td>");
                } else {
                    out.push_str(&format!("<td>{tags}</td>"));
                }
            }
            out.push_str("</tr>\n");
        }
        out.push_str("</table>\n");
    }

    out.push_str("</body>\n</html>\n");
    out
}
