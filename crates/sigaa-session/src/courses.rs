// Copyright 2026 SIGAA Session Contributors
// SPDX-License-Identifier: Apache-2.0

//! Interning of the courses a student is enrolled in.
//!
//! Parsing the same course listing twice yields the same `Arc<CourseStudent>`,
//! so state attached to a course is not duplicated between callers.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Fields scraped for one course of a student.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CourseStudentData {
    pub id: String,
    pub title: String,
    pub code: String,
    pub period: String,
    pub schedule: Option<String>,
    pub number_of_students: Option<u32>,
    /// Hidden form values that open the course page.
    pub form_values: BTreeMap<String, String>,
}

/// A course of the logged-in student.
#[derive(Debug, PartialEq, Eq)]
pub struct CourseStudent {
    data: CourseStudentData,
}

impl CourseStudent {
    pub fn data(&self) -> &CourseStudentData {
        &self.data
    }

    pub fn id(&self) -> &str {
        &self.data.id
    }

    pub fn title(&self) -> &str {
        &self.data.title
    }
}

/// Interning map from course data to its shared instance.
#[derive(Debug, Default)]
pub struct CourseFactory {
    courses: DashMap<CourseStudentData, Arc<CourseStudent>>,
}

impl CourseFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared instance for `data`; identical data returns the same `Arc`.
    pub fn create_course_student(&self, data: CourseStudentData) -> Arc<CourseStudent> {
        self.courses
            .entry(data.clone())
            .or_insert_with(|| Arc::new(CourseStudent { data }))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.courses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.courses.is_empty()
    }

    /// Forget every interned course.
    pub fn clear(&self) {
        self.courses.clear();
    }
}
