// Copyright 2026 SIGAA Session Contributors
// SPDX-License-Identifier: Apache-2.0

//! Desktop login form, used by UFPB, UNB and UFFS.

use crate::session::form::HtmlForm;

pub const FORM_PATH: &str = "/sigaa/logon.jsf";
pub const FORM_SELECTOR: &str = "form[name='form']";
pub const LOGIN_MARKER: &str = r#"action="/sigaa/logon.jsf""#;

const USERNAME_FIELD: &str = "form:login";
const PASSWORD_FIELD: &str = "form:senha";

pub fn fill(mut form: HtmlForm, username: &str, password: &str) -> HtmlForm {
    form.set(USERNAME_FIELD, username);
    form.set(PASSWORD_FIELD, password);
    form
}
