//! HTML for the message form.

use crate::glyph::FontSize;
use std::fmt::Write;

/// What the form shows: the current message and the selected size.
#[derive(Clone, Copy, Debug)]
pub struct FormView<'a> {
    pub message: &'a str,
    pub font_size: FontSize,
}

const STYLE: &str = "\
body { font-family: Arial; text-align: center; background: #f0f0f0; padding: 20px; }\
.container { max-width: 400px; margin: 0 auto; background: white; padding: 20px; border-radius: 10px; box-shadow: 0 2px 10px rgba(0,0,0,0.1); }\
h1 { color: #333; }\
textarea { width: 100%; height: 150px; padding: 10px; font-size: 16px; border: 2px solid #ddd; border-radius: 5px; box-sizing: border-box; }\
button { background: #4CAF50; color: white; padding: 12px 30px; font-size: 16px; border: none; border-radius: 5px; cursor: pointer; margin-top: 10px; }\
button:hover { background: #45a049; }\
.current { margin-top: 20px; padding: 10px; background: #e8f5e9; border-radius: 5px; }";

const REDIRECT_SCRIPT: &str =
    "<script>setTimeout(function(){window.location.href='/';}, 2000);</script>";

/// Escape text for use in element content and single- or double-quoted attributes.
pub fn escape_html(text: &str) -> String {
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

pub fn render_form(view: &FormView<'_>) -> String {
    let message = escape_html(view.message);
    let mut html = String::with_capacity(2048 + 2 * message.len());

    html.push_str("<!DOCTYPE html><html><head>");
    html.push_str("<meta charset='UTF-8'>");
    html.push_str("<meta name='viewport' content='width=device-width, initial-scale=1'>");
    html.push_str("<title>E-Paper Message</title>");
    let _ = write!(html, "<style>{STYLE}</style></head><body>");
    html.push_str("<div class='container'>");
    html.push_str("<h1>&#128241; E-Paper Message</h1>");
    html.push_str("<form method='POST' action='/send' accept-charset='UTF-8'>");
    let _ = write!(
        html,
        "<textarea name='message' placeholder='Enter your message here...' maxlength='200' \
         style='font-family: Arial;'>{message}</textarea><br>"
    );
    html.push_str(
        "<label for='fontsize' style='display: block; margin: 10px 0 5px 0; font-weight: bold;'>\
         Font Size:</label>",
    );
    html.push_str(
        "<select name='fontsize' id='fontsize' style='width: 100%; padding: 8px; font-size: 16px; \
         border: 2px solid #ddd; border-radius: 5px; box-sizing: border-box;'>",
    );
    for size in FontSize::ALL {
        let selected = if size == view.font_size { " selected" } else { "" };
        let _ = write!(
            html,
            "<option value='{}'{selected}>{}</option>",
            size.index(),
            size.label()
        );
    }
    html.push_str("</select><br>");
    html.push_str("<button type='submit'>Send to Display</button>");
    html.push_str("</form>");
    let _ = write!(
        html,
        "<div class='current'><strong>Current:</strong><br>{message}</div>"
    );
    html.push_str("</div></body></html>");
    html
}

/// The form followed by a script that returns the browser to `/` after two seconds.
pub fn render_form_with_redirect(view: &FormView<'_>) -> String {
    let mut html = render_form(view);
    html.push_str(REDIRECT_SCRIPT);
    html
}
