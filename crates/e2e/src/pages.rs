//! Page objects of the editor UI
//!
//! [`AppPage`] is the single entry point handed to tests as the `app` fixture.
//! Each page object turns an intent ("import this workflow") into
//! [`TestStep`]s and runs them on the shared [`Page`].

use std::sync::Arc;

use crate::browser::Page;
use crate::error::E2eResult;
use crate::spec::{TestStep, WaitState};

/// Entry point over every page object of the app
pub struct AppPage {
    page: Arc<Page>,
    pub workflows: WorkflowsPage,
    pub project_settings: ProjectSettingsPage,
}

impl AppPage {
    pub fn new(page: Arc<Page>) -> Self {
        Self {
            workflows: WorkflowsPage::new(page.clone()),
            project_settings: ProjectSettingsPage::new(page.clone()),
            page,
        }
    }

    pub fn page(&self) -> &Arc<Page> {
        &self.page
    }

    pub async fn go_home(&self) -> E2eResult<()> {
        self.page.goto("/").await
    }
}

/// Workflow list and the editor it opens into
pub struct WorkflowsPage {
    page: Arc<Page>,
}

impl WorkflowsPage {
    pub fn new(page: Arc<Page>) -> Self {
        Self { page }
    }

    pub async fn click_new_workflow_card(&self) -> E2eResult<()> {
        self.page
            .click(&self.page.test_id("new-workflow-card"))
            .await
    }

    /// Import a workflow file from the fixtures directory and rename it
    pub async fn import_workflow(&self, file_name: &str, name: &str) -> E2eResult<()> {
        self.page
            .run(&self.import_workflow_steps(file_name, name))
            .await
    }

    pub fn import_workflow_steps(&self, file_name: &str, name: &str) -> Vec<TestStep> {
        let path = self.page.context().config().fixtures_dir.join(file_name);
        let name_preview = format!("{} span", self.page.test_id("workflow-name-input"));

        vec![
            TestStep::Click {
                selector: self.page.test_id("workflow-menu"),
                timeout_ms: None,
            },
            TestStep::Click {
                selector: self.page.test_id("workflow-menu-item-import-from-file"),
                timeout_ms: None,
            },
            TestStep::Upload {
                selector: "input[type=file]".to_string(),
                path: path.to_string_lossy().into_owned(),
            },
            TestStep::Wait {
                selector: "[data-test-id=\"canvas-node\"]".to_string(),
                timeout_ms: 10_000,
                state: WaitState::Visible,
            },
            TestStep::Click {
                selector: name_preview,
                timeout_ms: None,
            },
            TestStep::Fill {
                selector: format!("{} input", self.page.test_id("workflow-name-input")),
                value: name.to_string(),
            },
            TestStep::Press {
                selector: None,
                key: "Enter".to_string(),
            },
        ]
    }

    /// Tags shown on the open workflow
    pub async fn workflow_tags(&self) -> E2eResult<Vec<String>> {
        let selector = format!("{} .el-tag", self.page.test_id("workflow-tags-container"));
        self.page.texts(&selector).await
    }
}

/// Settings of a team project
pub struct ProjectSettingsPage {
    page: Arc<Page>,
}

impl ProjectSettingsPage {
    pub fn new(page: Arc<Page>) -> Self {
        Self { page }
    }

    pub async fn fill_project_name(&self, name: &str) -> E2eResult<()> {
        self.page.run(&[self.fill_project_name_step(name)]).await
    }

    pub fn fill_project_name_step(&self, name: &str) -> TestStep {
        TestStep::Fill {
            selector: format!("{} input", self.page.test_id("project-settings-name-input")),
            value: name.to_string(),
        }
    }

    pub async fn click_save_button(&self) -> E2eResult<()> {
        self.page.click("role=button[name=\"Save\"]").await
    }
}
