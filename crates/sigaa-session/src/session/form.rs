// Copyright 2026 SIGAA Session Contributors
// SPDX-License-Identifier: Apache-2.0

//! Server-rendered HTML forms: action URL plus the field values to post back.

use super::page::Page;
use crate::error::{Result, SigaaError};
use scraper::{ElementRef, Selector};
use url::Url;

/// A single named field of a form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub name: String,
    /// Lower-cased `type` attribute; `select` for drop-downs.
    pub field_type: String,
    pub value: String,
}

/// A form scraped from a page, ready to be overlaid and submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlForm {
    /// Action resolved against the page URL.
    pub action: Url,
    /// Fields in document order.
    pub fields: Vec<FormField>,
}

impl HtmlForm {
    /// Parse the first form matching `css` on `page`.
    ///
    /// Checkboxes and radios only contribute when checked; a `select`
    /// contributes its selected option, or the first one.
    pub fn parse(page: &Page, css: &str) -> Result<Self> {
        let document = page.document();
        let form_sel = selector(css)?;
        let form = document
            .select(&form_sel)
            .next()
            .ok_or_else(|| SigaaError::MalformedForm(format!("no form matching {css}")))?;

        let action_raw = form
            .value()
            .attr("action")
            .filter(|a| !a.trim().is_empty())
            .ok_or_else(|| SigaaError::MalformedForm(format!("form {css} has no action")))?;
        let action = page.url().join(action_raw.trim())?;

        let field_sel = selector("input[name], select[name]")?;
        let option_sel = selector("option")?;
        let mut fields = Vec::new();

        for element in form.select(&field_sel) {
            let el = element.value();
            let Some(name) = el.attr("name") else {
                continue;
            };
            if el.name() == "select" {
                fields.push(FormField {
                    name: name.to_string(),
                    field_type: "select".to_string(),
                    value: selected_option(element, &option_sel),
                });
                continue;
            }
            let field_type = el.attr("type").unwrap_or("text").to_ascii_lowercase();
            if matches!(field_type.as_str(), "checkbox" | "radio") && el.attr("checked").is_none() {
                continue;
            }
            fields.push(FormField {
                name: name.to_string(),
                field_type,
                value: el.attr("value").unwrap_or_default().to_string(),
            });
        }

        Ok(Self { action, fields })
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }

    /// Fields whose `type` is `field_type`.
    pub fn fields_of_type<'a>(&'a self, field_type: &'a str) -> impl Iterator<Item = &'a FormField> {
        self.fields.iter().filter(move |f| f.field_type == field_type)
    }

    /// Overwrite a field, appending it when absent.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.fields.iter_mut().find(|f| f.name == name) {
            Some(field) => field.value = value,
            None => self.fields.push(FormField {
                name: name.to_string(),
                field_type: "hidden".to_string(),
                value,
            }),
        }
    }

    /// Drop every submit button; the caller picks the one to press.
    pub fn without_submits(mut self) -> Self {
        self.fields.retain(|f| f.field_type != "submit");
        self
    }

    /// Name of the submit button labelled `label`.
    pub fn submit_named(&self, label: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.field_type == "submit" && f.value == label)
            .map(|f| f.name.as_str())
    }

    /// `(name, value)` pairs in document order.
    pub fn post_values(&self) -> Vec<(String, String)> {
        self.fields
            .iter()
            .map(|f| (f.name.clone(), f.value.clone()))
            .collect()
    }
}

/// Compile a CSS selector.
pub(crate) fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| SigaaError::UnexpectedPage(format!("bad selector {css}: {e:?}")))
}

/// Text content with whitespace runs collapsed.
pub(crate) fn clean_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn selected_option(select: ElementRef<'_>, option_sel: &Selector) -> String {
    let options: Vec<ElementRef<'_>> = select.select(option_sel).collect();
    options
        .iter()
        .find(|o| o.value().attr("selected").is_some())
        .or(options.first())
        .map(|o| match o.value().attr("value") {
            Some(value) => value.to_string(),
            None => clean_text(*o),
        })
        .unwrap_or_default()
}
