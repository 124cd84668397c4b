//! Server-rendered pages

use askama::Template;

/// Browser harness exercising the HTTP and socket session sharing by hand
#[derive(Template)]
#[template(path = "test.html")]
pub struct TestHarnessTemplate {
    pub title: String,
    pub io_path: String,
    pub sessions_enabled: bool,
}
