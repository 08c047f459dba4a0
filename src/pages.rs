//! HTML for the gallery and detail pages.

use crate::models::caption::Caption;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// Everything outside the RFC 3986 unreserved set.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

fn page(background_color: &str, title: &str, body: &str) -> String {
    format!(
        concat!(
            "<!DOCTYPE html>",
            r#"<html lang="en"><head><meta charset="UTF-8">"#,
            "<title>{title}</title>",
            "<style>",
            "body {{ background-color: {color}; font-family: sans-serif; margin: 2em; }}",
            "main {{ background: white; padding: 1.5em; border-radius: 8px; max-width: 900px; }}",
            "img {{ max-width: 100%; }}",
            "</style></head>",
            "<body><main>{body}</main></body></html>"
        ),
        title = html_escape(title),
        color = html_escape(background_color),
        body = body,
    )
}

/// Upload form plus one entry per image. Entries link to the detail page
/// when captioning is on, and straight to the file otherwise.
pub fn gallery(background_color: &str, images: &[String], captioning_enabled: bool) -> String {
    let mut body = String::from(concat!(
        "<h1>Image Uploader</h1>",
        r#"<form method="POST" action="/upload" enctype="multipart/form-data">"#,
        r#"<div><label for="file">Choose a JPEG file to upload:</label> "#,
        r#"<input type="file" id="file" name="form_file" accept="image/jpeg" /></div>"#,
        r#"<div><button type="submit">Upload</button></div>"#,
        "</form><hr><h2>Existing Images</h2><ul>",
    ));

    for name in images {
        let link = if captioning_enabled {
            format!("/view/{}", encode_path_segment(name))
        } else {
            format!("/files/{}", encode_path_segment(name))
        };
        body.push_str(&format!(
            r#"<li><a href="{}">{}</a></li>"#,
            html_escape(&link),
            html_escape(name)
        ));
    }
    body.push_str("</ul>");

    page(background_color, "Image Uploader", &body)
}

/// Detail page: the image served through `/files/{name}`, its caption and
/// the backend's direct link.
pub fn detail(background_color: &str, name: &str, caption: &Caption, public_url: &str) -> String {
    let src = format!("/files/{}", encode_path_segment(name));
    let body = format!(
        concat!(
            "<h1>{title}</h1>",
            r#"<img src="{src}" alt="{alt}">"#,
            "<p>{description}</p>",
            r#"<p><small>{name} (<a href="{public_url}">direct link</a>)</small></p>"#,
            r#"<p><a href="/">Back to gallery</a></p>"#
        ),
        title = html_escape(&caption.title),
        src = html_escape(&src),
        alt = html_escape(&caption.title),
        description = html_escape(&caption.description),
        name = html_escape(name),
        public_url = html_escape(public_url),
    );
    page(background_color, &caption.title, &body)
}

pub fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn encode_path_segment(value: &str) -> String {
    utf8_percent_encode(value, PATH_SEGMENT).to_string()
}
