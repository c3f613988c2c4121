// Copyright 2026 SIGAA Session Contributors
// SPDX-License-Identifier: Apache-2.0

//! IFSC logs in through the mobile portal, then jumps to the desktop home.

use crate::error::{Result, SigaaError};
use crate::session::form::HtmlForm;
use crate::session::{Page, RequestOptions, SigaaHttp};
use std::sync::Arc;

pub const FORM_PATH: &str = "/sigaa/mobile/touch/login.jsf";
pub const FORM_SELECTOR: &str = "#form-login";
/// Present on every page that still shows the login form.
pub const LOGIN_MARKER: &str = "form-login";
/// Starts the redirect chain to the user's portal.
pub const LANDING_PATH: &str = "/sigaa/paginaInicial.do";

/// Put the credentials in the only text and password inputs.
pub fn fill(mut form: HtmlForm, username: &str, password: &str) -> Result<HtmlForm> {
    let user_field = single_field(&form, "text")?;
    let password_field = single_field(&form, "password")?;
    form.set(&user_field, username);
    form.set(&password_field, password);
    Ok(form)
}

fn single_field(form: &HtmlForm, field_type: &str) -> Result<String> {
    let mut fields = form.fields_of_type(field_type);
    match (fields.next(), fields.next()) {
        (Some(field), None) => Ok(field.name.clone()),
        (None, _) => Err(SigaaError::MalformedForm(format!(
            "no {field_type} input on login form"
        ))),
        (Some(_), Some(_)) => Err(SigaaError::MalformedForm(format!(
            "more than one {field_type} input on login form"
        ))),
    }
}

pub async fn land(http: &SigaaHttp) -> Result<Arc<Page>> {
    let jump = http.get(LANDING_PATH, RequestOptions::no_cache()).await?;
    http.follow_all_redirect(jump, RequestOptions::no_cache()).await
}
