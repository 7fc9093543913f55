// 📤 Export - Registrations and agents as spreadsheets and print reports
//
// Rows are built as plain string tables first; writers (CSV, HTML) only
// serialize what the table already holds.

use crate::entities::{Agent, FormQuestion, Panchayath, Registration};
use crate::error::Result;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Longest sanitized program name used in a filename
const MAX_FILENAME_STEM: usize = 50;

// ============================================================================
// DATE FORMATTING
// ============================================================================

/// `18 Oct 2026, 3:45 pm` in the display offset
pub fn format_datetime(dt: &DateTime<Utc>, offset: &FixedOffset) -> String {
    dt.with_timezone(offset).format("%d %b %Y, %-I:%M %P").to_string()
}

/// `18 Oct 2026` in the display offset
pub fn format_date(dt: &DateTime<Utc>, offset: &FixedOffset) -> String {
    dt.with_timezone(offset).format("%d %b %Y").to_string()
}

// ============================================================================
// TABLE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportTable {
    pub sheet: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ExportTable {
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(&self.headers)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn to_csv_string(&self) -> Result<String> {
        let mut buffer = Vec::new();
        self.write_csv(&mut buffer)?;
        String::from_utf8(buffer).map_err(|e| crate::error::AdminError::Export(e.to_string()))
    }

    pub fn write_csv_file(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)?;
        self.write_csv(file)?;
        info!("Wrote {} rows to {}", self.rows.len(), path.display());
        Ok(())
    }
}

// ============================================================================
// REGISTRATIONS
// ============================================================================

/// `#`, `Registration Date`, then one column per question in sort order.
/// List answers are joined with ", "; missing answers leave the cell empty.
pub fn registrations_table(
    registrations: &[Registration],
    questions: &[FormQuestion],
    offset: &FixedOffset,
) -> ExportTable {
    let questions = FormQuestion::sorted(questions);

    let mut headers = vec!["#".to_string(), "Registration Date".to_string()];
    headers.extend(questions.iter().map(|q| q.question_text.clone()));

    let rows = registrations
        .iter()
        .enumerate()
        .map(|(i, registration)| {
            let mut row = vec![
                (i + 1).to_string(),
                format_datetime(&registration.created_at, offset),
            ];
            row.extend(questions.iter().map(|q| registration.answers.cell(&q.id)));
            row
        })
        .collect();

    ExportTable {
        sheet: "Registrations".to_string(),
        headers,
        rows,
    }
}

// ============================================================================
// AGENTS
// ============================================================================

pub const AGENT_HEADERS: [&str; 9] = [
    "#",
    "Name",
    "Mobile",
    "Role",
    "Panchayath",
    "Ward",
    "Customer Count",
    "Status",
    "Created At",
];

pub fn agents_table(agents: &[Agent], panchayaths: &[Panchayath], offset: &FixedOffset) -> ExportTable {
    let names: HashMap<&str, &str> = panchayaths
        .iter()
        .map(|p| (p.id.as_str(), p.name.as_str()))
        .collect();

    let rows = agents
        .iter()
        .enumerate()
        .map(|(i, agent)| {
            let panchayath = agent
                .panchayath_name
                .as_deref()
                .filter(|n| !n.is_empty())
                .or_else(|| agent.panchayath_id.as_deref().and_then(|id| names.get(id).copied()))
                .unwrap_or("");

            vec![
                (i + 1).to_string(),
                agent.name.clone(),
                agent.mobile.clone(),
                agent.role.label().to_string(),
                panchayath.to_string(),
                agent.ward.clone(),
                if agent.role.is_leaf() { agent.customer_count.to_string() } else { String::new() },
                if agent.is_active { "Active" } else { "Inactive" }.to_string(),
                format_date(&agent.created_at, offset),
            ]
        })
        .collect();

    ExportTable {
        sheet: "Agents".to_string(),
        headers: AGENT_HEADERS.iter().map(|h| h.to_string()).collect(),
        rows,
    }
}

/// Customers owned by pro agents
pub fn total_pro_customers(agents: &[Agent]) -> u64 {
    agents
        .iter()
        .filter(|a| a.role.is_leaf())
        .map(|a| a.customer_count)
        .sum()
}

fn escape_html(text: &str) -> String {
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

const REPORT_STYLE: &str = "body { font-family: Arial, sans-serif; margin: 20px; font-size: 12px; color: #333; }
    h1 { font-size: 18px; margin-bottom: 4px; }
    .meta { color: #666; margin-bottom: 16px; font-size: 11px; }
    .summary { display: flex; gap: 24px; margin-bottom: 16px; }
    .summary-item { font-weight: bold; }
    table { border-collapse: collapse; width: 100%; }
    th { background: #f3f4f6; text-align: left; padding: 6px 8px; border: 1px solid #d1d5db; font-size: 11px; white-space: nowrap; }
    td { padding: 5px 8px; border: 1px solid #e5e7eb; font-size: 11px; }
    tr:nth-child(even) { background: #f9fafb; }
    @media print { body { margin: 10px; } }";

/// Printable agents report with totals
pub fn agents_report_html(
    agents: &[Agent],
    panchayaths: &[Panchayath],
    offset: &FixedOffset,
    generated_at: &DateTime<Utc>,
) -> String {
    let table = agents_table(agents, panchayaths, offset);

    let body: String = table
        .rows
        .iter()
        .map(|row| {
            let cells: String = row.iter().map(|c| format!("<td>{}</td>", escape_html(c))).collect();
            format!("<tr>{}</tr>\n", cells)
        })
        .collect();

    format!(
        "<!DOCTYPE html>
<html>
<head>
  <title>Pennyekart Agents</title>
  <style>
    {style}
  </style>
</head>
<body>
  <h1>Pennyekart Agents Report</h1>
  <div class=\"meta\">Generated on {generated}</div>
  <div class=\"summary\">
    <span class=\"summary-item\">Total Agents: {agents}</span>
    <span class=\"summary-item\">Total Customers: {customers}</span>
  </div>
  <table>
    <thead>
      <tr><th>#</th><th>Name</th><th>Mobile</th><th>Role</th><th>Panchayath</th><th>Ward</th><th>Customers</th><th>Status</th><th>Created</th></tr>
    </thead>
    <tbody>
{body}    </tbody>
  </table>
</body>
</html>
",
        style = REPORT_STYLE,
        generated = format_datetime(generated_at, offset),
        agents = agents.len(),
        customers = total_pro_customers(agents),
        body = body,
    )
}

// ============================================================================
// FILENAMES
// ============================================================================

/// Non-alphanumerics become `_`; at most 50 characters
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(MAX_FILENAME_STEM)
        .collect()
}

pub fn registrations_filename(program_name: &str, date: NaiveDate) -> String {
    format!(
        "{}_registrations_{}.csv",
        sanitize_filename(program_name),
        date.format("%Y-%m-%d")
    )
}

pub fn agents_filename(date: NaiveDate) -> String {
    format!("Pennyekart_Agents_{}.csv", date.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::{agent, registration};
    use crate::entities::AgentRole;
    use chrono::TimeZone;
    use serde_json::json;

    fn ist() -> FixedOffset {
        FixedOffset::east_opt(330 * 60).unwrap()
    }

    fn question(id: &str, text: &str, sort_order: i64) -> FormQuestion {
        FormQuestion {
            id: id.to_string(),
            program_id: "p1".to_string(),
            question_text: text.to_string(),
            question_type: "text".to_string(),
            options: vec![],
            is_required: false,
            sort_order,
        }
    }

    #[test]
    fn test_registrations_table_shape() {
        let questions = vec![
            question("q3", "Crops", 3),
            question("q1", "Village", 1),
            question("q2", "Acres", 2),
        ];
        let registrations = vec![
            registration("r1", "p1", json!({"q1": "Kodur", "q2": 3, "q3": ["Rice", "Banana"]}), 10),
            registration("r2", "p1", json!({"q1": "Vengara", "q3": null}), 5),
        ];

        let table = registrations_table(&registrations, &questions, &ist());
        assert_eq!(table.headers, vec!["#", "Registration Date", "Village", "Acres", "Crops"]);
        assert_eq!(table.rows.len(), 2);
        assert!(table.rows.iter().all(|r| r.len() == 5));
        assert_eq!(table.rows[0][0], "1");
        assert_eq!(table.rows[0][4], "Rice, Banana");
        assert_eq!(table.rows[0][3], "3");
        assert_eq!(table.rows[1][3], "");
        assert_eq!(table.rows[1][4], "");
        // 09:10 UTC is 14:40 IST
        assert_eq!(table.rows[0][1], "01 Oct 2026, 2:40 pm");
    }

    #[test]
    fn test_csv_output_quotes_commas() {
        let questions = vec![question("q1", "Crops", 1)];
        let registrations = vec![registration("r1", "p1", json!({"q1": ["Rice", "Banana"]}), 0)];

        let csv = registrations_table(&registrations, &questions, &ist()).to_csv_string().unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("#,Registration Date,Crops"));
        assert_eq!(lines.next(), Some("1,\"01 Oct 2026, 2:30 pm\",\"Rice, Banana\""));
    }

    #[test]
    fn test_agents_table_columns() {
        let mut leader = agent("tl", AgentRole::TeamLeader, None, 9);
        leader.panchayath_id = Some("p1".into());
        let mut pro = agent("pr", AgentRole::Pro, Some("tl"), 12);
        pro.panchayath_name = Some("Kodur".into());
        pro.is_active = false;

        let panchayaths = vec![Panchayath { id: "p1".into(), name: "Vengara".into(), is_active: true }];
        let table = agents_table(&[leader, pro], &panchayaths, &ist());

        assert_eq!(table.headers.len(), 9);
        assert_eq!(table.rows[0][3], "Team Leader");
        assert_eq!(table.rows[0][4], "Vengara");
        assert_eq!(table.rows[0][6], "");
        assert_eq!(table.rows[1][4], "Kodur");
        assert_eq!(table.rows[1][6], "12");
        assert_eq!(table.rows[1][7], "Inactive");
        assert_eq!(table.rows[1][8], "01 Oct 2026");
    }

    #[test]
    fn test_report_escapes_and_totals() {
        let mut pro = agent("p", AgentRole::Pro, None, 4);
        pro.name = "<script>alert(1)</script>".into();
        let leader = agent("t", AgentRole::TeamLeader, None, 100);
        let generated = Utc.with_ymd_and_hms(2026, 10, 18, 10, 15, 0).unwrap();

        let html = agents_report_html(&[pro, leader], &[], &ist(), &generated);
        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("Total Agents: 2"));
        assert!(html.contains("Total Customers: 4"));
        assert!(html.contains("Generated on 18 Oct 2026, 3:45 pm"));
    }

    #[test]
    fn test_filenames() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        assert_eq!(
            registrations_filename("Farm School: Batch #2", date),
            "Farm_School__Batch__2_registrations_2026-10-18.csv"
        );
        assert_eq!(agents_filename(date), "Pennyekart_Agents_2026-10-18.csv");

        let long = "x".repeat(80);
        assert_eq!(sanitize_filename(&long).len(), 50);
        assert_eq!(sanitize_filename("കൃഷി"), "____");
    }
}
