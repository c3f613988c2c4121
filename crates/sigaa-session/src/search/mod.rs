// Copyright 2026 SIGAA Session Contributors
// SPDX-License-Identifier: Apache-2.0

//! Public (unauthenticated) searches.

pub mod subject;

pub use subject::{
    Campus, SearchParams, SearchVariant, SubjectResult, SubjectSearch, TeamResult, NO_RESULTS_MARKER,
    SEARCH_PATH,
};

use crate::institution::Institution;
use crate::session::SigaaHttp;

/// Entry point for the public search pages of a portal.
#[derive(Clone)]
pub struct Search {
    http: SigaaHttp,
    institution: Institution,
}

impl Search {
    pub fn new(http: SigaaHttp, institution: Institution) -> Self {
        Self { http, institution }
    }

    /// Class schedule search.
    pub fn subject(&self) -> SubjectSearch {
        SubjectSearch::new(self.http.clone(), SearchVariant::for_institution(self.institution))
    }
}
