// Copyright 2026 SIGAA Session Contributors
// SPDX-License-Identifier: Apache-2.0

//! Class schedule search (`/sigaa/public/turmas/listar.jsf`).
//!
//! The result table groups classes under subject header rows:
//!
//! ```text
//! tr.agrupador      "DAE1234 - CALCULO I"
//! tr.linhaPar       Código | Docente | Horário | Local
//! tr.linhaImpar     ...
//! tr.agrupador      next subject
//! ```
//!
//! Class columns are located through the table header, so reordered or
//! extra columns do not break parsing.

use crate::error::{Result, SigaaError};
use crate::session::form::{clean_text, selector, HtmlForm};
use crate::session::{Page, RequestOptions, SigaaHttp};
use crate::institution::Institution;
use chrono::Datelike;
use scraper::ElementRef;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

pub const SEARCH_PATH: &str = "/sigaa/public/turmas/listar.jsf";
pub const NO_RESULTS_MARKER: &str =
    "Não foram encontrados resultados para a busca com estes parâmetros.";

const FORM_SELECTOR: &str = r#"form[name="formTurma"]"#;
const CAMPUS_SELECTOR: &str = r#"select[id="formTurma:inputDepto"] > option"#;
const SEARCH_BUTTON: &str = "Buscar";
const DEPARTMENT_FIELD: &str = "formTurma:inputDepto";
const YEAR_FIELD: &str = "formTurma:inputAno";
const PERIOD_FIELD: &str = "formTurma:inputPeriodo";
const LEVEL_FIELD: &str = "formTurma:inputNivel";
/// Department value selecting every campus.
const ALL_DEPARTMENTS: &str = "0";

pub const MIN_YEAR: i32 = 1950;

/// A campus or department option of the search form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campus {
    pub name: String,
    pub value: String,
}

/// Search filters. Unset fields fall back to every campus, the current
/// year and the first period.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchParams {
    pub campus: Option<Campus>,
    pub year: Option<i32>,
    pub period: Option<u8>,
}

impl SearchParams {
    /// Fill defaults and check ranges against `current_year`.
    pub fn resolve(&self, current_year: i32) -> Result<(String, i32, u8)> {
        let year = self.year.unwrap_or(current_year);
        if !(MIN_YEAR..=current_year + 1).contains(&year) {
            return Err(SigaaError::InvalidSearchParameter(format!(
                "year {year} outside {MIN_YEAR}..={}",
                current_year + 1
            )));
        }
        let period = self.period.unwrap_or(1);
        if !matches!(period, 1 | 2) {
            return Err(SigaaError::InvalidSearchParameter(format!(
                "period {period} must be 1 or 2"
            )));
        }
        let department = self
            .campus
            .as_ref()
            .map(|c| c.value.clone())
            .unwrap_or_else(|| ALL_DEPARTMENTS.to_string());
        Ok((department, year, period))
    }
}

/// A class offered for a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamResult {
    pub id: String,
    pub teacher: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    pub location: String,
}

/// A subject and its classes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectResult {
    pub id: String,
    pub name: String,
    pub teams: Vec<TeamResult>,
}

/// Which filters the portal's search form accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchVariant {
    /// Department, year, period and level.
    Full,
    /// Department only.
    Basic,
}

impl SearchVariant {
    pub fn for_institution(institution: Institution) -> Self {
        match institution {
            Institution::Unb => SearchVariant::Basic,
            Institution::Ifsc | Institution::Ufpb | Institution::Uffs => SearchVariant::Full,
        }
    }
}

/// Subject search bound to one session.
pub struct SubjectSearch {
    http: SigaaHttp,
    variant: SearchVariant,
    /// Search form page, loaded once per instance.
    page: Mutex<Option<Arc<Page>>>,
}

impl SubjectSearch {
    pub fn new(http: SigaaHttp, variant: SearchVariant) -> Self {
        Self {
            http,
            variant,
            page: Mutex::new(None),
        }
    }

    pub fn variant(&self) -> SearchVariant {
        self.variant
    }

    async fn search_page(&self) -> Result<Arc<Page>> {
        let mut slot = self.page.lock().await;
        if let Some(page) = slot.as_ref() {
            return Ok(Arc::clone(page));
        }
        let page = self.http.get(SEARCH_PATH, RequestOptions::default()).await?;
        *slot = Some(Arc::clone(&page));
        Ok(page)
    }

    /// Campus options of the search form.
    pub async fn campus_list(&self) -> Result<Vec<Campus>> {
        let page = self.search_page().await?;
        parse_campus_list(&page)
    }

    pub async fn search(&self, params: &SearchParams) -> Result<Vec<SubjectResult>> {
        let (department, year, period) = params.resolve(chrono::Local::now().year())?;
        let page = self.search_page().await?;

        let form = HtmlForm::parse(&page, FORM_SELECTOR)?;
        let button = form
            .submit_named(SEARCH_BUTTON)
            .map(str::to_string)
            .ok_or_else(|| SigaaError::UnexpectedPage("search button not found".into()))?;

        let mut form = form.without_submits();
        form.set(DEPARTMENT_FIELD, department);
        if self.variant == SearchVariant::Full {
            form.set(LEVEL_FIELD, "");
            form.set(YEAR_FIELD, year.to_string());
            form.set(PERIOD_FIELD, period.to_string());
        }
        form.set(&button, SEARCH_BUTTON);

        let results = self
            .http
            .post(form.action.as_str(), &form.post_values(), RequestOptions::default())
            .await?;
        parse_results(&results)
    }
}

pub fn parse_campus_list(page: &Page) -> Result<Vec<Campus>> {
    let document = page.document();
    let option_sel = selector(CAMPUS_SELECTOR)?;
    Ok(document
        .select(&option_sel)
        .map(|option| Campus {
            name: clean_text(option),
            value: option.value().attr("value").unwrap_or_default().trim().to_string(),
        })
        .collect())
}

pub fn parse_results(page: &Page) -> Result<Vec<SubjectResult>> {
    if page.contains(NO_RESULTS_MARKER) {
        return Ok(Vec::new());
    }
    let document = page.document();
    let header_sel = selector("table.listagem > thead > tr > th")?;
    let row_sel = selector("table.listagem > tbody > tr[class]")?;
    let title_sel = selector("span.tituloDisciplina")?;
    let cell_sel = selector("td")?;

    let headers: Vec<String> = document.select(&header_sel).map(clean_text).collect();
    let mut results: Vec<SubjectResult> = Vec::new();

    for row in document.select(&row_sel) {
        if has_class(row, "agrupador") {
            let title = row
                .select(&title_sel)
                .next()
                .map(clean_text)
                .unwrap_or_else(|| clean_text(row));
            results.push(parse_subject(&title)?);
        } else if has_class(row, "linhaPar") || has_class(row, "linhaImpar") {
            let cells: Vec<String> = row.select(&cell_sel).map(clean_text).collect();
            let team = parse_team(&headers, &cells)?;
            results
                .last_mut()
                .ok_or_else(|| SigaaError::UnexpectedPage("class row before any subject".into()))?
                .teams
                .push(team);
        }
    }
    Ok(results)
}

fn has_class(row: ElementRef<'_>, class: &str) -> bool {
    row.value().classes().any(|c| c == class)
}

fn parse_subject(title: &str) -> Result<SubjectResult> {
    let (id, name) = title
        .split_once(" - ")
        .or_else(|| title.split_once('-'))
        .ok_or_else(|| SigaaError::UnexpectedPage(format!("subject title {title:?}")))?;
    Ok(SubjectResult {
        id: id.trim().to_string(),
        name: name.trim().to_string(),
        teams: Vec::new(),
    })
}

fn parse_team(headers: &[String], cells: &[String]) -> Result<TeamResult> {
    let mut id = None;
    let mut teacher = None;
    let mut schedule = None;
    let mut location = None;

    for (header, value) in headers.iter().zip(cells) {
        match header.as_str() {
            "Código" => id = Some(value.clone()),
            "Docente" => teacher = Some(value.clone()),
            "Horário" => schedule = Some(value.clone()),
            "Local" => location = Some(value.clone()),
            _ => {}
        }
    }

    let missing = |column: &str| SigaaError::UnexpectedPage(format!("class row without {column}"));
    Ok(TeamResult {
        id: id.ok_or_else(|| missing("Código"))?,
        teacher: teacher.ok_or_else(|| missing("Docente"))?,
        schedule: schedule.filter(|s| !s.is_empty()),
        location: location.ok_or_else(|| missing("Local"))?,
    })
}
