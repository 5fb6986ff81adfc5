use std::fmt::Write;

use crate::admin::Broadcast;
use crate::models::StatusRecord;

const STYLE: &str = r#"
body { font-family: system-ui, sans-serif; max-width: 52rem; margin: 2rem auto; padding: 0 1rem; color: #222; }
h1 { font-size: 1.6rem; }
.broadcast { background: #fff4d6; border: 1px solid #e8c15a; border-radius: 6px; padding: .75rem 1rem; margin-bottom: 1.5rem; }
.service { display: flex; justify-content: space-between; align-items: center; border-bottom: 1px solid #eee; padding: .6rem 0; }
.service .meta { color: #777; font-size: .85rem; }
.service .reason { color: #b03a2e; font-size: .85rem; }
.badge { border-radius: 4px; padding: .2rem .6rem; font-weight: 600; color: #fff; }
.up { background: #2ecc71; }
.down { background: #e74c3c; }
.empty { color: #777; }
form { margin-top: 2rem; display: grid; gap: .5rem; }
"#;

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
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

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{title}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n{body}</body>\n</html>\n",
        title = escape(title),
    )
}

fn broadcast_banner(out: &mut String, broadcast: Option<&Broadcast>) {
    if let Some(broadcast) = broadcast {
        let _ = writeln!(out, "<div class=\"broadcast\">{}</div>", escape(&broadcast.message));
    }
}

fn service_list(out: &mut String, records: &[StatusRecord]) {
    if records.is_empty() {
        out.push_str("<p class=\"empty\">No services configured.</p>\n");
        return;
    }

    for record in records {
        let _ = write!(
            out,
            "<div class=\"service\">\n<div>\n<strong>{name}</strong>\n<div class=\"meta\">{kind}</div>\n",
            name = escape(&record.name),
            kind = escape(record.display_type()),
        );
        if !record.reason.is_empty() {
            let _ = writeln!(out, "<div class=\"reason\">{}</div>", escape(&record.reason));
        }
        let _ = writeln!(
            out,
            "</div>\n<span class=\"badge {verdict}\">{label}</span>\n</div>",
            verdict = record.verdict(),
            label = if record.is_up { "Online" } else { "Offline" },
        );
    }
}

/// Public dashboard. Service URLs are never rendered.
pub fn dashboard(title: &str, records: &[StatusRecord], broadcast: Option<&Broadcast>) -> String {
    let mut body = String::new();
    let _ = writeln!(body, "<h1>{}</h1>", escape(title));
    broadcast_banner(&mut body, broadcast);
    service_list(&mut body, records);
    page(title, &body)
}

pub fn admin(
    title: &str,
    records: &[StatusRecord],
    broadcast: Option<&Broadcast>,
    prefix: &str,
) -> String {
    let mut body = String::new();
    let _ = writeln!(body, "<h1>{} &middot; Admin</h1>", escape(title));
    broadcast_banner(&mut body, broadcast);
    service_list(&mut body, records);

    let _ = write!(
        body,
        "<form method=\"post\" action=\"{prefix}/admin/message\">\n\
         <label>Broadcast message <input name=\"message\" required></label>\n\
         <label>Show for (minutes) <input name=\"ttl_minutes\" type=\"number\" min=\"1\" value=\"60\"></label>\n\
         <button type=\"submit\">Publish</button>\n</form>\n\
         <form method=\"post\" action=\"{prefix}/admin/message/clear\">\n\
         <button type=\"submit\">Clear message</button>\n</form>\n",
        prefix = escape(prefix),
    );
    page(&format!("{title} - Admin"), &body)
}
