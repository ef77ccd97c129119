use std::sync::Arc;

use tokio::runtime::{Handle, Runtime};

use crate::{
    Config, CrewGraphError, Result,
    client::{HttpClient, Services},
    editor::Editor,
    session::{Session, SessionHandle},
};

pub struct SessionBuilder {
    project: String,
    config: Config,
    services: Option<Services>,
    data_polling: bool,
    rt: Option<Arc<Runtime>>,
}

impl SessionBuilder {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            config: Config::default(),
            services: None,
            data_polling: true,
            rt: None,
        }
    }

    pub fn config(
        mut self,
        config: Config,
    ) -> Self {
        self.config = config;
        self
    }

    /// Use these services instead of an [`HttpClient`] built from the config.
    pub fn services(
        mut self,
        services: Services,
    ) -> Self {
        self.services = Some(services);
        self
    }

    /// Periodically re-read agents and tasks, on by default.
    pub fn data_polling(
        mut self,
        enabled: bool,
    ) -> Self {
        self.data_polling = enabled;
        self
    }

    pub fn runtime(
        mut self,
        runtime: Arc<Runtime>,
    ) -> Self {
        self.rt = Some(runtime);
        self
    }

    /// Spawn the session and return a handle to it.
    ///
    /// Without an explicit runtime the session is spawned on the current one.
    pub fn build(self) -> Result<SessionHandle> {
        let handle = match &self.rt {
            Some(rt) => rt.handle().clone(),
            None => Handle::try_current().map_err(|e| CrewGraphError::Session(e.to_string()))?,
        };
        let services = match self.services {
            Some(services) => services,
            None => Services::from_backend(Arc::new(HttpClient::new(&self.config.api)?)),
        };

        let editor = Editor::new(self.config.layout.clone()).with_log_window(self.config.activity.log_window);
        let session = Session::new(self.project, editor, services, self.config.polling.clone(), self.data_polling);
        let session_handle = session.handle();
        handle.spawn(session.run());

        Ok(session_handle)
    }
}
