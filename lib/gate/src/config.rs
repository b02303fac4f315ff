//! Gate configuration.

use learnhub_session::Role;
use serde::Deserialize;

/// Route gate settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GateConfig {
    /// Sign-in page.
    #[serde(default = "default_sign_in_path")]
    pub sign_in_path: String,
    /// Query parameter carrying the post-login target.
    #[serde(default = "default_redirect_param")]
    pub redirect_param: String,
    /// Seconds before `exp` at which the gate already treats a token as
    /// expired.
    #[serde(default)]
    pub tolerance_secs: i64,
    /// Landing page for students.
    #[serde(default = "default_student_landing")]
    pub student_landing: String,
    /// Landing page for teachers.
    #[serde(default = "default_teacher_landing")]
    pub teacher_landing: String,
    /// Landing page for admins.
    #[serde(default = "default_admin_landing")]
    pub admin_landing: String,
}

fn default_sign_in_path() -> String {
    "/sign-in".to_string()
}

fn default_redirect_param() -> String {
    "redirect".to_string()
}

fn default_student_landing() -> String {
    "/dashboard".to_string()
}

fn default_teacher_landing() -> String {
    "/teacher".to_string()
}

fn default_admin_landing() -> String {
    "/admin".to_string()
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            sign_in_path: default_sign_in_path(),
            redirect_param: default_redirect_param(),
            tolerance_secs: 0,
            student_landing: default_student_landing(),
            teacher_landing: default_teacher_landing(),
            admin_landing: default_admin_landing(),
        }
    }
}

impl GateConfig {
    /// Returns the landing page for `role`.
    #[must_use]
    pub fn landing(&self, role: Role) -> &str {
        match role {
            Role::Student => &self.student_landing,
            Role::Teacher => &self.teacher_landing,
            Role::Admin => &self.admin_landing,
        }
    }
}
