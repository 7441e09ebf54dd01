// 🧱 HTML shells - static pages that point at the JSON artifacts
//
// Pages carry a server-rendered fallback plus a `data-source` pointing at
// the artifact the client script hydrates from. Styling lives elsewhere.

use crate::record::EntityRecord;
use crate::stats::AggregateStatistics;
use crate::writer::{AccountSummary, SiteLayout};
use std::fmt::Write;
use url::Url;

/// Escape text for use in element content and double-quoted attributes
pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
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

/// Only http(s) URLs are emitted as links or image sources
fn web_url(raw: &str) -> Option<&str> {
    let url = Url::parse(raw.trim()).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| raw.trim())
}

fn avatar_img(raw: &str) -> String {
    match web_url(raw) {
        Some(src) => format!("<img src=\"{}\" alt=\"\" loading=\"lazy\">", escape(src)),
        None => String::new(),
    }
}

fn page(title: &str, root: &str, data_source: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n\
         <html lang=\"en\">\n\
         <head>\n\
         <meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{title}</title>\n\
         <link rel=\"stylesheet\" href=\"{root}assets/site.css\">\n\
         <link rel=\"alternate\" type=\"application/json\" href=\"{root}{data_source}\">\n\
         </head>\n\
         <body>\n\
         <main id=\"app\" data-source=\"{root}{data_source}\">\n\
         {body}\
         </main>\n\
         <script src=\"{root}assets/site.js\" defer></script>\n\
         </body>\n\
         </html>\n",
        title = escape(title),
        root = root,
        data_source = data_source,
        body = body,
    )
}

/// Root listing page
pub fn render_index(site_title: &str, accounts: &[AccountSummary]) -> String {
    let mut body = String::new();
    let _ = writeln!(body, "<h1>{}</h1>", escape(site_title));
    let _ = writeln!(
        body,
        "<p><a href=\"{}\">Statistics</a> &middot; {} accounts</p>",
        SiteLayout::STATS_PAGE,
        accounts.len()
    );
    body.push_str("<ul class=\"accounts\">\n");
    for account in accounts {
        let _ = writeln!(
            body,
            "<li><a href=\"{href}\">{avatar} \
             <strong>{name}</strong> <span>@{id}</span></a></li>",
            href = escape(&SiteLayout::account_page_rel(&account.identifier)),
            avatar = avatar_img(&account.avatar_url),
            name = escape(&account.display_name),
            id = escape(&account.identifier),
        );
    }
    body.push_str("</ul>\n");

    page(site_title, "", SiteLayout::LISTING, &body)
}

/// Aggregate statistics page
pub fn render_stats_page(site_title: &str, stats: &AggregateStatistics) -> String {
    let mut body = String::new();
    let _ = writeln!(body, "<h1>{} &mdash; statistics</h1>", escape(site_title));
    let _ = writeln!(body, "<p><a href=\"index.html\">All accounts</a></p>");
    body.push_str("<dl class=\"totals\">\n");
    for (label, value) in [
        ("Accounts", stats.total_accounts),
        ("Affiliated", stats.affiliated_count),
        ("Independent", stats.independent_count),
        ("Verified", stats.verified_count),
        ("Not verified", stats.unverified_count),
        ("Free accounts", stats.free_accounts),
    ] {
        let _ = writeln!(body, "<dt>{}</dt><dd>{}</dd>", label, value);
    }
    body.push_str("</dl>\n");

    for (heading, rows) in [
        ("Top affiliations", &stats.top_affiliations),
        ("Top linked sites", &stats.top_hosts),
    ] {
        let _ = writeln!(body, "<h2>{}</h2>\n<ol>", heading);
        for row in rows {
            let _ = writeln!(body, "<li>{} ({})</li>", escape(&row.label), row.count);
        }
        body.push_str("</ol>\n");
    }
    let _ = writeln!(
        body,
        "<p class=\"generated\">Generated {}</p>",
        stats.generated_at.to_rfc3339()
    );

    page(site_title, "", SiteLayout::STATS, &body)
}

/// Detail page for one account, two directories below the site root
pub fn render_account_page(site_title: &str, record: &EntityRecord) -> String {
    let mut body = String::new();
    let _ = writeln!(
        body,
        "<p><a href=\"../../index.html\">{}</a></p>",
        escape(site_title)
    );
    let _ = writeln!(
        body,
        "<header>{}<h1>{}</h1><p>@{}</p></header>",
        avatar_img(&record.avatar_url),
        escape(&record.display_name),
        escape(&record.identifier)
    );
    let _ = writeln!(body, "<p class=\"bio\">{}</p>", escape(&record.bio_text));

    if !record.proofs.is_empty() {
        body.push_str("<h2>Proofs</h2>\n<ol class=\"proofs\">\n");
        for proof in &record.proofs {
            let _ = write!(
                body,
                "<li><strong>{}</strong> <time>{}</time> {}",
                escape(&proof.label),
                escape(&proof.date),
                escape(&proof.description)
            );
            for url in &proof.urls {
                match web_url(url) {
                    Some(href) => {
                        let _ = write!(
                            body,
                            " <a href=\"{0}\" rel=\"nofollow noopener\">{0}</a>",
                            escape(href)
                        );
                    }
                    None => {
                        let _ = write!(body, " <span class=\"url\">{}</span>", escape(url));
                    }
                }
            }
            body.push_str("</li>\n");
        }
        body.push_str("</ol>\n");
    }

    let title = format!("{} (@{}) - {}", record.display_name, record.identifier, site_title);
    page(
        &title,
        "../../",
        &SiteLayout::detail_rel(&record.identifier),
        &body,
    )
}
