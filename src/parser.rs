use crate::error::SyncError;
use crate::session::ReportService;
use crate::types::{RemoteReport, ReportStatus};
use log::{debug, warn};
use quick_xml::events::Event;
use quick_xml::Reader;

const LIST_ROOT: &str = "REPORT_LIST_OUTPUT";
const ERROR_ROOT: &str = "SIMPLE_RETURN";

pub async fn fetch_listing(service: &dyn ReportService) -> Result<Vec<RemoteReport>, SyncError> {
    let body = service.list_finished().await?;
    let reports = parse_report_list(&body)?;
    debug!("Report list contains {} entries", reports.len());
    Ok(reports)
}

#[derive(Default)]
struct PartialReport {
    id: String,
    title: String,
    output_format: String,
    status: Option<String>,
}

impl PartialReport {
    fn field(&mut self, stack: &[String]) -> Option<&mut String> {
        let (last, parent) = match stack {
            [.., parent, last] => (last.as_str(), parent.as_str()),
            _ => return None,
        };
        match (parent, last) {
            ("REPORT", "ID") => Some(&mut self.id),
            ("REPORT", "TITLE") => Some(&mut self.title),
            ("REPORT", "OUTPUT_FORMAT") => Some(&mut self.output_format),
            ("REPORT", "STATUS") | ("STATUS", "STATE") => {
                Some(self.status.get_or_insert_with(String::new))
            }
            _ => None,
        }
    }

    /// Entries without an ID or TITLE cannot be catalogued and are dropped.
    fn finish(self) -> Option<RemoteReport> {
        let id = self.id.trim().to_string();
        let title = self.title.trim().to_string();
        if id.is_empty() || title.is_empty() {
            warn!(
                "Skipping listed report with id {:?} and title {:?}: ID and TITLE are required",
                id, title
            );
            return None;
        }
        let status = match self.status {
            Some(state) => ReportStatus::from_state(&state),
            None => {
                debug!("Report {} has no STATUS, treating as not finished", id);
                ReportStatus::Other
            }
        };
        Some(RemoteReport {
            id,
            title,
            output_format: self.output_format.trim().to_string(),
            status,
        })
    }
}

/// Parses the `action=list` response into report entries.
///
/// An empty or absent `REPORT_LIST` is a valid, empty listing. A
/// `SIMPLE_RETURN` document is the service reporting a failure.
pub fn parse_report_list(raw: &str) -> Result<Vec<RemoteReport>, SyncError> {
    let mut reader = Reader::from_str(raw);
    reader.trim_text(true);

    let mut stack: Vec<String> = Vec::new();
    let mut root: Option<String> = None;
    let mut current: Option<PartialReport> = None;
    let mut reports = Vec::new();
    let mut error_code = String::new();
    let mut error_text = String::new();

    loop {
        let event = reader.read_event().map_err(|e| {
            let pos = reader.buffer_position().min(raw.len());
            let start = char_floor(raw, pos.saturating_sub(80));
            SyncError::parse(format!("malformed markup at byte {}: {}", pos, e), &raw[start..])
        })?;

        match event {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if root.is_none() {
                    root = Some(name.clone());
                }
                if name == "REPORT" && stack.last().map(String::as_str) == Some("REPORT_LIST") {
                    current = Some(PartialReport::default());
                }
                stack.push(name);
            }
            Event::End(_) => {
                if let Some(name) = stack.pop() {
                    if name == "REPORT" && stack.last().map(String::as_str) == Some("REPORT_LIST") {
                        if let Some(report) = current.take().and_then(PartialReport::finish) {
                            reports.push(report);
                        }
                    }
                }
            }
            Event::Empty(e) => {
                if root.is_none() {
                    root = Some(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                }
            }
            Event::Text(e) => {
                let text = e
                    .unescape()
                    .map_err(|err| SyncError::parse(format!("bad text: {}", err), raw))?;
                collect_text(&text, &stack, &mut current, &mut error_code, &mut error_text);
            }
            Event::CData(e) => {
                let bytes = e.into_inner();
                let text = String::from_utf8_lossy(&bytes);
                collect_text(&text, &stack, &mut current, &mut error_code, &mut error_text);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(SyncError::parse(
            format!("document truncated inside <{}>", stack.join("><")),
            raw,
        ));
    }

    match root.as_deref() {
        Some(LIST_ROOT) => Ok(reports),
        Some(ERROR_ROOT) => Err(SyncError::Api {
            code: error_code.trim().to_string(),
            text: error_text.trim().to_string(),
        }),
        Some(other) => Err(SyncError::parse(format!("unexpected root element <{}>", other), raw)),
        None => Err(SyncError::parse("empty document", raw)),
    }
}

fn collect_text(
    text: &str,
    stack: &[String],
    current: &mut Option<PartialReport>,
    error_code: &mut String,
    error_text: &mut String,
) {
    if let Some(report) = current.as_mut() {
        if let Some(field) = report.field(stack) {
            field.push_str(text);
        }
        return;
    }
    match stack {
        [root, .., last] if root == ERROR_ROOT && last == "CODE" => error_code.push_str(text),
        [root, .., last] if root == ERROR_ROOT && last == "TEXT" => error_text.push_str(text),
        _ => {}
    }
}

fn char_floor(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}
