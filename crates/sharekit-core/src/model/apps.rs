//! Site collection app catalog
//!
//! [`AppManager`] borrows a [`Context`] and drives the app lifecycle:
//! upload, deploy, install, upgrade, uninstall, retract and remove. Server
//! side effects of install/upgrade/uninstall run asynchronously on the
//! service and are not awaited.

use std::path::Path;

use tracing::debug;
use uuid::Uuid;

use super::require;
use crate::domain::batch::Batch;
use crate::domain::errors::BatchError;
use crate::domain::newtypes::{escape_odata_literal, ObjectId, ResourcePath};
use crate::domain::object::{EntityKind, ParentLink};
use crate::domain::request::{Payload, RequestSpec, ResultBinding};
use crate::domain::selector::PropertySelector;
use crate::domain::value::{PropertyBag, PropertyValue};
use crate::engine::context::{block_on, Context, RequestHandle};

/// Nested catalog object of the web
pub const APP_CATALOG: &str = "SiteCollectionAppCatalog";
/// Catalog collection holding the available apps
pub const AVAILABLE_APPS: &str = "AvailableApps";

const CATALOG_PATH: &str = "_api/web/sitecollectionappcatalog";
const APP_BY_ID: &str = "_api/web/sitecollectionappcatalog/AvailableApps/GetById('{anchor}')";

/// Result of [`AppManager::install`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The install request was accepted
    Installed,
    /// The app already reports an installed version; nothing was sent
    AlreadyInstalled,
}

impl Context {
    /// App manager for the site collection app catalog
    pub fn site_collection_app_manager(&mut self) -> AppManager<'_> {
        AppManager { ctx: self }
    }
}

/// Lifecycle operations on the site collection app catalog
pub struct AppManager<'a> {
    ctx: &'a mut Context,
}

fn app_path(app: ObjectId) -> Result<ResourcePath, BatchError> {
    Ok(ResourcePath::anchored(APP_BY_ID, app, "Id")?)
}

impl<'a> AppManager<'a> {
    /// The context this manager operates on
    pub fn context(&mut self) -> &mut Context {
        &mut *self.ctx
    }

    /// Catalog object holding `AvailableApps`
    pub fn catalog(&mut self) -> Result<ObjectId, BatchError> {
        let web = self.ctx.web();
        self.ctx.child_object(web, APP_CATALOG)
    }

    /// Apps materialized into the catalog so far
    pub fn apps(&mut self) -> Result<Vec<ObjectId>, BatchError> {
        let catalog = self.catalog()?;
        self.ctx.members(catalog, AVAILABLE_APPS)
    }

    fn app_placeholder(&mut self) -> Result<ObjectId, BatchError> {
        let catalog = self.catalog()?;
        Ok(self
            .ctx
            .create_object(EntityKind::App, Some(ParentLink::collection(catalog, AVAILABLE_APPS))))
    }

    /// Graph object for an app id, reusing a materialized one when present
    pub fn app_for_id(&mut self, id: Uuid) -> Result<ObjectId, BatchError> {
        if id.is_nil() {
            return Err(BatchError::invalid("app id must not be empty"));
        }
        let catalog = self.catalog()?;
        if let Some(app) =
            self.ctx
                .graph()
                .find_member(catalog, AVAILABLE_APPS, "Id", &PropertyValue::Guid(id))?
        {
            return Ok(app);
        }
        let app = self.app_placeholder()?;
        self.ctx.object_mut(app)?.set_property("Id", id)?;
        Ok(app)
    }

    // ========================================================================
    // Add
    // ========================================================================

    /// Uploads a package read from disk
    ///
    /// # Errors
    /// [`BatchError::InvalidArgument`] for an empty path,
    /// [`BatchError::PackageUnreadable`] when the file cannot be read.
    pub async fn add_from_path(
        &mut self,
        path: impl AsRef<Path>,
        overwrite: bool,
    ) -> Result<ObjectId, BatchError> {
        let path = path.as_ref();
        let shown = path.to_string_lossy().to_string();
        require(&shown, "package path")?;
        let filename = path
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .ok_or_else(|| BatchError::invalid(format!("{shown} has no file name")))?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| BatchError::PackageUnreadable {
                path: shown.clone(),
                reason: e.to_string(),
            })?;
        debug!(path = %shown, size = bytes.len(), "Read app package");
        self.add(bytes, &filename, overwrite).await
    }

    pub fn add_from_path_blocking(
        &mut self,
        path: impl AsRef<Path>,
        overwrite: bool,
    ) -> Result<ObjectId, BatchError> {
        block_on(self.add_from_path(path, overwrite))?
    }

    /// Uploads package bytes; the app's metadata is loaded in the same batch
    pub async fn add(
        &mut self,
        bytes: Vec<u8>,
        filename: &str,
        overwrite: bool,
    ) -> Result<ObjectId, BatchError> {
        let mut batch = self.ctx.new_batch();
        let app = self.add_to(Some(&mut batch), bytes, filename, overwrite)?;
        self.ctx.run_private(batch).await?;
        Ok(app)
    }

    pub fn add_batch(
        &mut self,
        bytes: Vec<u8>,
        filename: &str,
        overwrite: bool,
    ) -> Result<ObjectId, BatchError> {
        self.add_to(None, bytes, filename, overwrite)
    }

    pub fn add_in(
        &mut self,
        batch: &mut Batch,
        bytes: Vec<u8>,
        filename: &str,
        overwrite: bool,
    ) -> Result<ObjectId, BatchError> {
        self.add_to(Some(batch), bytes, filename, overwrite)
    }

    pub fn add_blocking(
        &mut self,
        bytes: Vec<u8>,
        filename: &str,
        overwrite: bool,
    ) -> Result<ObjectId, BatchError> {
        block_on(self.add(bytes, filename, overwrite))?
    }

    fn add_to(
        &mut self,
        mut batch: Option<&mut Batch>,
        bytes: Vec<u8>,
        filename: &str,
        overwrite: bool,
    ) -> Result<ObjectId, BatchError> {
        let filename = require(filename, "package file name")?;
        if bytes.is_empty() {
            return Err(BatchError::invalid("package content must not be empty"));
        }
        let upload = ResourcePath::new(format!(
            "{CATALOG_PATH}/Add(overwrite={overwrite},url='{}')",
            escape_odata_literal(filename)
        ))?;

        let app = self.app_placeholder()?;
        self.ctx.enqueue_to(
            batch.as_deref_mut(),
            RequestSpec::add(upload, app, Payload::Binary(bytes)),
        )?;
        // The upload answers with file metadata; its UniqueId is the app id
        self.ctx.enqueue_to(
            batch,
            RequestSpec::get(ResourcePath::anchored(APP_BY_ID, app, "UniqueId")?, app),
        )?;
        Ok(app)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// All apps available in the catalog
    pub async fn get_available_apps(&mut self) -> Result<Vec<ObjectId>, BatchError> {
        let mut batch = self.ctx.new_batch();
        let handle = self.get_available_apps_to(Some(&mut batch))?;
        Ok(self.ctx.run_private_for(batch, &handle).await?.objects)
    }

    pub fn get_available_apps_batch(&mut self) -> Result<RequestHandle, BatchError> {
        self.get_available_apps_to(None)
    }

    pub fn get_available_apps_in(&mut self, batch: &mut Batch) -> Result<RequestHandle, BatchError> {
        self.get_available_apps_to(Some(batch))
    }

    pub fn get_available_apps_blocking(&mut self) -> Result<Vec<ObjectId>, BatchError> {
        block_on(self.get_available_apps())?
    }

    fn get_available_apps_to(&mut self, batch: Option<&mut Batch>) -> Result<RequestHandle, BatchError> {
        let catalog = self.catalog()?;
        let path = ResourcePath::new(format!("{CATALOG_PATH}/{AVAILABLE_APPS}"))?;
        self.ctx.enqueue_to(
            batch,
            RequestSpec::get(path, catalog)
                .with_binding(ResultBinding::Collection(AVAILABLE_APPS.to_string())),
        )
    }

    /// First app whose title matches, or `None`
    pub async fn get_available_app_by_title(&mut self, title: &str) -> Result<Option<ObjectId>, BatchError> {
        let mut batch = self.ctx.new_batch();
        let handle = self.get_available_app_by_title_to(Some(&mut batch), title)?;
        Ok(self.ctx.run_private_for(batch, &handle).await?.objects.first().copied())
    }

    pub fn get_available_app_by_title_batch(&mut self, title: &str) -> Result<RequestHandle, BatchError> {
        self.get_available_app_by_title_to(None, title)
    }

    pub fn get_available_app_by_title_in(
        &mut self,
        batch: &mut Batch,
        title: &str,
    ) -> Result<RequestHandle, BatchError> {
        self.get_available_app_by_title_to(Some(batch), title)
    }

    pub fn get_available_app_by_title_blocking(
        &mut self,
        title: &str,
    ) -> Result<Option<ObjectId>, BatchError> {
        block_on(self.get_available_app_by_title(title))?
    }

    fn get_available_app_by_title_to(
        &mut self,
        batch: Option<&mut Batch>,
        title: &str,
    ) -> Result<RequestHandle, BatchError> {
        let title = require(title, "app title")?;
        let catalog = self.catalog()?;
        let path = ResourcePath::new(format!(
            "{CATALOG_PATH}/{AVAILABLE_APPS}?$filter=Title eq '{}'",
            escape_odata_literal(title)
        ))?;
        self.ctx.enqueue_to(
            batch,
            RequestSpec::get(path, catalog)
                .with_binding(ResultBinding::Collection(AVAILABLE_APPS.to_string())),
        )
    }

    /// App by id, or `None` when the catalog does not know it
    pub async fn get_available_app_by_id(&mut self, id: Uuid) -> Result<Option<ObjectId>, BatchError> {
        let mut batch = self.ctx.new_batch();
        let app = self.get_available_app_by_id_to(Some(&mut batch), id)?;
        self.ctx.run_lookup(batch, app).await
    }

    pub fn get_available_app_by_id_batch(&mut self, id: Uuid) -> Result<ObjectId, BatchError> {
        self.get_available_app_by_id_to(None, id)
    }

    pub fn get_available_app_by_id_in(&mut self, batch: &mut Batch, id: Uuid) -> Result<ObjectId, BatchError> {
        self.get_available_app_by_id_to(Some(batch), id)
    }

    pub fn get_available_app_by_id_blocking(&mut self, id: Uuid) -> Result<Option<ObjectId>, BatchError> {
        block_on(self.get_available_app_by_id(id))?
    }

    fn get_available_app_by_id_to(
        &mut self,
        batch: Option<&mut Batch>,
        id: Uuid,
    ) -> Result<ObjectId, BatchError> {
        let app = self.app_for_id(id)?;
        let path = ResourcePath::new(format!("{CATALOG_PATH}/{AVAILABLE_APPS}/GetById('{id}')"))?;
        self.ctx.enqueue_to(batch, RequestSpec::get(path, app))?;
        Ok(app)
    }

    // ========================================================================
    // Lifecycle actions
    // ========================================================================

    /// Enqueues `action` on `app`, optionally followed by a refresh of the
    /// app's state
    fn action_to(
        &mut self,
        mut batch: Option<&mut Batch>,
        app: ObjectId,
        action: &str,
        payload: Payload,
        refresh: bool,
    ) -> Result<RequestHandle, BatchError> {
        let path = app_path(app)?.join(action);
        let handle = self.ctx.enqueue_to(
            batch.as_deref_mut(),
            RequestSpec::custom(action, path, app).with_payload(payload),
        )?;
        if refresh {
            let selector =
                PropertySelector::parse(["Deployed", "InstalledVersion", "AppCatalogVersion", "CanUpgrade"])?;
            self.ctx.enqueue_to(
                batch,
                RequestSpec::get(app_path(app)?, app).with_selector(selector.with_key("Id")),
            )?;
        }
        Ok(handle)
    }

    async fn run_action(
        &mut self,
        app: ObjectId,
        action: &str,
        payload: Payload,
        refresh: bool,
    ) -> Result<bool, BatchError> {
        let mut batch = self.ctx.new_batch();
        self.action_to(Some(&mut batch), app, action, payload, refresh)?;
        self.ctx.run_private(batch).await?;
        Ok(true)
    }

    fn deploy_payload(skip_feature_deployment: bool) -> Payload {
        Payload::Properties(PropertyBag::new().with("skipFeatureDeployment", skip_feature_deployment))
    }

    /// Deploys (trusts) the app in the catalog
    pub async fn deploy(&mut self, app: ObjectId, skip_feature_deployment: bool) -> Result<bool, BatchError> {
        self.run_action(app, "Deploy", Self::deploy_payload(skip_feature_deployment), true)
            .await
    }

    pub async fn deploy_by_id(&mut self, id: Uuid, skip_feature_deployment: bool) -> Result<bool, BatchError> {
        let app = self.app_for_id(id)?;
        self.deploy(app, skip_feature_deployment).await
    }

    pub fn deploy_batch(&mut self, app: ObjectId, skip_feature_deployment: bool) -> Result<RequestHandle, BatchError> {
        self.action_to(None, app, "Deploy", Self::deploy_payload(skip_feature_deployment), true)
    }

    pub fn deploy_in(
        &mut self,
        batch: &mut Batch,
        app: ObjectId,
        skip_feature_deployment: bool,
    ) -> Result<RequestHandle, BatchError> {
        self.action_to(Some(batch), app, "Deploy", Self::deploy_payload(skip_feature_deployment), true)
    }

    pub fn deploy_blocking(&mut self, app: ObjectId, skip_feature_deployment: bool) -> Result<bool, BatchError> {
        block_on(self.deploy(app, skip_feature_deployment))?
    }

    /// Removes the app's deployment from the catalog
    pub async fn retract(&mut self, app: ObjectId) -> Result<bool, BatchError> {
        self.run_action(app, "Retract", Payload::None, true).await
    }

    pub async fn retract_by_id(&mut self, id: Uuid) -> Result<bool, BatchError> {
        let app = self.app_for_id(id)?;
        self.retract(app).await
    }

    pub fn retract_batch(&mut self, app: ObjectId) -> Result<RequestHandle, BatchError> {
        self.action_to(None, app, "Retract", Payload::None, true)
    }

    pub fn retract_in(&mut self, batch: &mut Batch, app: ObjectId) -> Result<RequestHandle, BatchError> {
        self.action_to(Some(batch), app, "Retract", Payload::None, true)
    }

    /// Installs the app on the site
    ///
    /// Returns [`InstallOutcome::AlreadyInstalled`] without any request when
    /// the app already reports an installed version.
    pub async fn install(&mut self, app: ObjectId) -> Result<InstallOutcome, BatchError> {
        let mut batch = self.ctx.new_batch();
        match self.install_to(Some(&mut batch), app)? {
            Some(_) => {
                self.ctx.run_private(batch).await?;
                Ok(InstallOutcome::Installed)
            }
            None => Ok(InstallOutcome::AlreadyInstalled),
        }
    }

    pub async fn install_by_id(&mut self, id: Uuid) -> Result<InstallOutcome, BatchError> {
        let app = self.app_for_id(id)?;
        self.install(app).await
    }

    /// `None` when the app is already installed
    pub fn install_batch(&mut self, app: ObjectId) -> Result<Option<RequestHandle>, BatchError> {
        self.install_to(None, app)
    }

    pub fn install_in(
        &mut self,
        batch: &mut Batch,
        app: ObjectId,
    ) -> Result<Option<RequestHandle>, BatchError> {
        self.install_to(Some(batch), app)
    }

    pub fn install_blocking(&mut self, app: ObjectId) -> Result<InstallOutcome, BatchError> {
        block_on(self.install(app))?
    }

    fn install_to(
        &mut self,
        batch: Option<&mut Batch>,
        app: ObjectId,
    ) -> Result<Option<RequestHandle>, BatchError> {
        let installed = self
            .ctx
            .object(app)?
            .property("InstalledVersion")?
            .is_some_and(|v| !v.is_null() && v.as_str() != Some(""));
        if installed {
            debug!(app = %app, "App already installed");
            return Ok(None);
        }
        self.action_to(batch, app, "Install", Payload::None, false)
            .map(Some)
    }

    /// Upgrades the installed app to the catalog version
    pub async fn upgrade(&mut self, app: ObjectId) -> Result<bool, BatchError> {
        self.run_action(app, "Upgrade", Payload::None, false).await
    }

    pub async fn upgrade_by_id(&mut self, id: Uuid) -> Result<bool, BatchError> {
        let app = self.app_for_id(id)?;
        self.upgrade(app).await
    }

    pub fn upgrade_batch(&mut self, app: ObjectId) -> Result<RequestHandle, BatchError> {
        self.action_to(None, app, "Upgrade", Payload::None, false)
    }

    pub fn upgrade_in(&mut self, batch: &mut Batch, app: ObjectId) -> Result<RequestHandle, BatchError> {
        self.action_to(Some(batch), app, "Upgrade", Payload::None, false)
    }

    /// Uninstalls the app from the site
    ///
    /// The app's state is refreshed in the same batch, so a later
    /// [`install`](Self::install) sees the cleared `InstalledVersion`.
    pub async fn uninstall(&mut self, app: ObjectId) -> Result<bool, BatchError> {
        self.run_action(app, "Uninstall", Payload::None, true).await
    }

    pub async fn uninstall_by_id(&mut self, id: Uuid) -> Result<bool, BatchError> {
        let app = self.app_for_id(id)?;
        self.uninstall(app).await
    }

    pub fn uninstall_batch(&mut self, app: ObjectId) -> Result<RequestHandle, BatchError> {
        self.action_to(None, app, "Uninstall", Payload::None, true)
    }

    pub fn uninstall_in(&mut self, batch: &mut Batch, app: ObjectId) -> Result<RequestHandle, BatchError> {
        self.action_to(Some(batch), app, "Uninstall", Payload::None, true)
    }

    /// Removes the app from the catalog; the app object is deleted
    pub async fn remove(&mut self, app: ObjectId) -> Result<bool, BatchError> {
        let mut batch = self.ctx.new_batch();
        self.remove_to(Some(&mut batch), app)?;
        self.ctx.run_private(batch).await?;
        Ok(true)
    }

    pub async fn remove_by_id(&mut self, id: Uuid) -> Result<bool, BatchError> {
        let app = self.app_for_id(id)?;
        self.remove(app).await
    }

    pub fn remove_batch(&mut self, app: ObjectId) -> Result<RequestHandle, BatchError> {
        self.remove_to(None, app)
    }

    pub fn remove_in(&mut self, batch: &mut Batch, app: ObjectId) -> Result<RequestHandle, BatchError> {
        self.remove_to(Some(batch), app)
    }

    fn remove_to(&mut self, batch: Option<&mut Batch>, app: ObjectId) -> Result<RequestHandle, BatchError> {
        self.ctx.enqueue_to(
            batch,
            RequestSpec::custom("Remove", app_path(app)?.join("Remove"), app)
                .with_binding(ResultBinding::Remove),
        )
    }
}
