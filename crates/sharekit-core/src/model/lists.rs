//! Web, list and list item operations

use std::ops::BitOr;

use uuid::Uuid;

use super::require;
use crate::domain::batch::Batch;
use crate::domain::errors::BatchError;
use crate::domain::newtypes::{escape_odata_literal, ObjectId, ResourcePath};
use crate::domain::object::{EntityKind, ParentLink};
use crate::domain::request::{Payload, RequestSpec, ResultBinding};
use crate::domain::selector::PropertySelector;
use crate::domain::value::{PropertyBag, PropertyValue};
use crate::engine::context::{block_on, Context, RequestHandle, RequestResult};

/// Web collection holding the site's lists
pub const LISTS: &str = "Lists";
/// List collection holding its items
pub const ITEMS: &str = "Items";
/// Nested IRM settings object of a list
pub const IRM_SETTINGS: &str = "InformationRightsManagementSettings";

const WEB_PATH: &str = "_api/web";
const LISTS_PATH: &str = "_api/web/lists";
const LIST_BY_ID: &str = "_api/web/lists(guid'{anchor}')";

// ============================================================================
// Options
// ============================================================================

/// Base template of a new list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListTemplateType {
    GenericList,
    DocumentLibrary,
    Survey,
    Links,
    Announcements,
    Contacts,
    Events,
    Tasks,
    DiscussionBoard,
    PictureLibrary,
    /// Any other server template id
    Custom(i32),
}

impl ListTemplateType {
    /// Server-side template id
    pub fn value(self) -> i32 {
        match self {
            ListTemplateType::GenericList => 100,
            ListTemplateType::DocumentLibrary => 101,
            ListTemplateType::Survey => 102,
            ListTemplateType::Links => 103,
            ListTemplateType::Announcements => 104,
            ListTemplateType::Contacts => 105,
            ListTemplateType::Events => 106,
            ListTemplateType::Tasks => 107,
            ListTemplateType::DiscussionBoard => 108,
            ListTemplateType::PictureLibrary => 109,
            ListTemplateType::Custom(id) => id,
        }
    }
}

impl std::str::FromStr for ListTemplateType {
    type Err = BatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "generic" | "genericlist" | "list" => Ok(ListTemplateType::GenericList),
            "documentlibrary" | "library" => Ok(ListTemplateType::DocumentLibrary),
            "survey" => Ok(ListTemplateType::Survey),
            "links" => Ok(ListTemplateType::Links),
            "announcements" => Ok(ListTemplateType::Announcements),
            "contacts" => Ok(ListTemplateType::Contacts),
            "events" => Ok(ListTemplateType::Events),
            "tasks" => Ok(ListTemplateType::Tasks),
            "discussionboard" => Ok(ListTemplateType::DiscussionBoard),
            "picturelibrary" => Ok(ListTemplateType::PictureLibrary),
            other => other
                .parse::<i32>()
                .map(ListTemplateType::Custom)
                .map_err(|_| BatchError::invalid(format!("unknown list template '{s}'"))),
        }
    }
}

/// CAML query passed to `GetItems`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CamlQueryOptions {
    pub view_xml: String,
    pub dates_in_utc: bool,
    /// Restricts the query to one folder
    pub folder_server_relative_url: Option<String>,
}

impl CamlQueryOptions {
    fn to_payload(&self) -> PropertyBag {
        let mut query = PropertyBag::new()
            .with("ViewXml", self.view_xml.as_str())
            .with("DatesInUtc", self.dates_in_utc);
        if let Some(folder) = &self.folder_server_relative_url {
            query.insert("FolderServerRelativeUrl", folder.as_str());
        }
        PropertyBag::new().with("query", query)
    }
}

impl From<&str> for CamlQueryOptions {
    fn from(view_xml: &str) -> Self {
        Self {
            view_xml: view_xml.to_string(),
            ..Self::default()
        }
    }
}

impl From<String> for CamlQueryOptions {
    fn from(view_xml: String) -> Self {
        Self {
            view_xml,
            ..Self::default()
        }
    }
}

/// Flags selecting what `RenderListDataAsStream` returns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions(pub u32);

impl RenderOptions {
    pub const DEFAULT: RenderOptions = RenderOptions(0);
    pub const CONTEXT_INFO: RenderOptions = RenderOptions(1);
    pub const LIST_DATA: RenderOptions = RenderOptions(2);
    pub const LIST_SCHEMA: RenderOptions = RenderOptions(4);
    pub const MENU_VIEW: RenderOptions = RenderOptions(8);
}

impl BitOr for RenderOptions {
    type Output = RenderOptions;

    fn bitor(self, rhs: Self) -> Self::Output {
        RenderOptions(self.0 | rhs.0)
    }
}

/// Parameters of a list data stream request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderListDataOptions {
    pub view_xml: String,
    pub render_options: RenderOptions,
}

impl RenderListDataOptions {
    pub fn list_data(view_xml: impl Into<String>) -> Self {
        Self {
            view_xml: view_xml.into(),
            render_options: RenderOptions::LIST_DATA,
        }
    }

    fn to_payload(&self) -> PropertyBag {
        let parameters = PropertyBag::new()
            .with("ViewXml", self.view_xml.as_str())
            .with("RenderOptions", self.render_options.0);
        PropertyBag::new().with("parameters", parameters)
    }
}

fn list_path(list: ObjectId) -> Result<ResourcePath, BatchError> {
    Ok(ResourcePath::anchored(LIST_BY_ID, list, "Id")?)
}

fn recycle_item_id(result: &RequestResult) -> Result<Uuid, BatchError> {
    result
        .body
        .get("value")
        .and_then(PropertyValue::as_guid)
        .ok_or_else(|| BatchError::MalformedResponse {
            request_id: result.request_id,
            reason: "recycle response carries no recycle bin item id".to_string(),
        })
}

// ============================================================================
// Web
// ============================================================================

impl Context {
    /// Loads the web with `selector` (e.g. `Lists`)
    pub async fn load_web(&mut self, selector: PropertySelector) -> Result<ObjectId, BatchError> {
        let mut batch = self.new_batch();
        let web = self.load_web_to(Some(&mut batch), selector)?;
        self.run_private(batch).await?;
        Ok(web)
    }

    pub fn load_web_batch(&mut self, selector: PropertySelector) -> Result<ObjectId, BatchError> {
        self.load_web_to(None, selector)
    }

    pub fn load_web_in(
        &mut self,
        batch: &mut Batch,
        selector: PropertySelector,
    ) -> Result<ObjectId, BatchError> {
        self.load_web_to(Some(batch), selector)
    }

    pub fn load_web_blocking(&mut self, selector: PropertySelector) -> Result<ObjectId, BatchError> {
        block_on(self.load_web(selector))?
    }

    fn load_web_to(
        &mut self,
        batch: Option<&mut Batch>,
        selector: PropertySelector,
    ) -> Result<ObjectId, BatchError> {
        let web = self.web();
        self.enqueue_to(
            batch,
            RequestSpec::get(ResourcePath::new(WEB_PATH)?, web).with_selector(selector),
        )?;
        Ok(web)
    }

    /// Lists materialized into the web so far
    pub fn lists(&self) -> Result<Vec<ObjectId>, BatchError> {
        self.members(self.web(), LISTS)
    }

    /// Reuses an already materialized list when `key` matches, otherwise
    /// creates a placeholder
    fn list_object(&mut self, key: &str, value: PropertyValue) -> Result<ObjectId, BatchError> {
        let web = self.web();
        match self.graph().find_member(web, LISTS, key, &value)? {
            Some(list) => Ok(list),
            None => Ok(self.create_object(EntityKind::List, Some(ParentLink::collection(web, LISTS)))),
        }
    }
}

// ============================================================================
// List lookup
// ============================================================================

impl Context {
    /// Gets a list by title; `None` when it does not exist
    pub async fn get_list_by_title(
        &mut self,
        title: &str,
        selector: PropertySelector,
    ) -> Result<Option<ObjectId>, BatchError> {
        let mut batch = self.new_batch();
        let list = self.get_list_by_title_to(Some(&mut batch), title, selector)?;
        self.run_lookup(batch, list).await
    }

    pub fn get_list_by_title_batch(
        &mut self,
        title: &str,
        selector: PropertySelector,
    ) -> Result<ObjectId, BatchError> {
        self.get_list_by_title_to(None, title, selector)
    }

    pub fn get_list_by_title_in(
        &mut self,
        batch: &mut Batch,
        title: &str,
        selector: PropertySelector,
    ) -> Result<ObjectId, BatchError> {
        self.get_list_by_title_to(Some(batch), title, selector)
    }

    pub fn get_list_by_title_blocking(
        &mut self,
        title: &str,
        selector: PropertySelector,
    ) -> Result<Option<ObjectId>, BatchError> {
        block_on(self.get_list_by_title(title, selector))?
    }

    fn get_list_by_title_to(
        &mut self,
        batch: Option<&mut Batch>,
        title: &str,
        selector: PropertySelector,
    ) -> Result<ObjectId, BatchError> {
        let title = require(title, "list title")?;
        let path = ResourcePath::new(format!(
            "{LISTS_PATH}/getbytitle('{}')",
            escape_odata_literal(title)
        ))?;
        let list = self.list_object("Title", PropertyValue::from(title))?;
        self.enqueue_to(
            batch,
            RequestSpec::get(path, list).with_selector(selector.with_key("Id")),
        )?;
        Ok(list)
    }

    /// Gets a list by id; `None` when it does not exist
    pub async fn get_list_by_id(
        &mut self,
        id: Uuid,
        selector: PropertySelector,
    ) -> Result<Option<ObjectId>, BatchError> {
        let mut batch = self.new_batch();
        let list = self.get_list_by_id_to(Some(&mut batch), id, selector)?;
        self.run_lookup(batch, list).await
    }

    pub fn get_list_by_id_batch(
        &mut self,
        id: Uuid,
        selector: PropertySelector,
    ) -> Result<ObjectId, BatchError> {
        self.get_list_by_id_to(None, id, selector)
    }

    pub fn get_list_by_id_in(
        &mut self,
        batch: &mut Batch,
        id: Uuid,
        selector: PropertySelector,
    ) -> Result<ObjectId, BatchError> {
        self.get_list_by_id_to(Some(batch), id, selector)
    }

    fn get_list_by_id_to(
        &mut self,
        batch: Option<&mut Batch>,
        id: Uuid,
        selector: PropertySelector,
    ) -> Result<ObjectId, BatchError> {
        if id.is_nil() {
            return Err(BatchError::invalid("list id must not be empty"));
        }
        let path = ResourcePath::new(format!("{LISTS_PATH}(guid'{id}')"))?;
        let list = self.list_object("Id", PropertyValue::Guid(id))?;
        self.enqueue_to(
            batch,
            RequestSpec::get(path, list).with_selector(selector.with_key("Id")),
        )?;
        Ok(list)
    }

    /// Gets a list by server-relative URL; `None` when it does not exist
    pub async fn get_list_by_server_relative_url(
        &mut self,
        url: &str,
        selector: PropertySelector,
    ) -> Result<Option<ObjectId>, BatchError> {
        let mut batch = self.new_batch();
        let list = self.get_list_by_server_relative_url_to(Some(&mut batch), url, selector)?;
        self.run_lookup(batch, list).await
    }

    pub fn get_list_by_server_relative_url_batch(
        &mut self,
        url: &str,
        selector: PropertySelector,
    ) -> Result<ObjectId, BatchError> {
        self.get_list_by_server_relative_url_to(None, url, selector)
    }

    pub fn get_list_by_server_relative_url_in(
        &mut self,
        batch: &mut Batch,
        url: &str,
        selector: PropertySelector,
    ) -> Result<ObjectId, BatchError> {
        self.get_list_by_server_relative_url_to(Some(batch), url, selector)
    }

    pub fn get_list_by_server_relative_url_blocking(
        &mut self,
        url: &str,
        selector: PropertySelector,
    ) -> Result<Option<ObjectId>, BatchError> {
        block_on(self.get_list_by_server_relative_url(url, selector))?
    }

    fn get_list_by_server_relative_url_to(
        &mut self,
        batch: Option<&mut Batch>,
        url: &str,
        selector: PropertySelector,
    ) -> Result<ObjectId, BatchError> {
        let url = require(url, "server relative url")?;
        let path = ResourcePath::new(format!(
            "{WEB_PATH}/getlist('{}')",
            escape_odata_literal(url)
        ))?;
        let web = self.web();
        let list = self.create_object(EntityKind::List, Some(ParentLink::collection(web, LISTS)));
        self.enqueue_to(
            batch,
            RequestSpec::get(path, list).with_selector(selector.with_key("Id")),
        )?;
        Ok(list)
    }
}

// ============================================================================
// List lifecycle
// ============================================================================

impl Context {
    /// Creates a list; it joins the web's `Lists` once the server confirms it
    pub async fn add_list(
        &mut self,
        title: &str,
        template: ListTemplateType,
    ) -> Result<ObjectId, BatchError> {
        let mut batch = self.new_batch();
        let list = self.add_list_to(Some(&mut batch), title, template)?;
        self.run_private(batch).await?;
        Ok(list)
    }

    pub fn add_list_batch(
        &mut self,
        title: &str,
        template: ListTemplateType,
    ) -> Result<ObjectId, BatchError> {
        self.add_list_to(None, title, template)
    }

    pub fn add_list_in(
        &mut self,
        batch: &mut Batch,
        title: &str,
        template: ListTemplateType,
    ) -> Result<ObjectId, BatchError> {
        self.add_list_to(Some(batch), title, template)
    }

    pub fn add_list_blocking(
        &mut self,
        title: &str,
        template: ListTemplateType,
    ) -> Result<ObjectId, BatchError> {
        block_on(self.add_list(title, template))?
    }

    fn add_list_to(
        &mut self,
        batch: Option<&mut Batch>,
        title: &str,
        template: ListTemplateType,
    ) -> Result<ObjectId, BatchError> {
        let title = require(title, "list title")?;
        let payload = PropertyBag::new()
            .with("Title", title)
            .with("BaseTemplate", template.value());
        let web = self.web();
        let list = self.create_object(EntityKind::List, Some(ParentLink::collection(web, LISTS)));
        self.enqueue_to(
            batch,
            RequestSpec::add(ResourcePath::new(LISTS_PATH)?, list, Payload::Properties(payload)),
        )?;
        Ok(list)
    }

    /// Sends property changes; on success they become the list's state
    pub async fn update_list(&mut self, list: ObjectId, changes: PropertyBag) -> Result<(), BatchError> {
        let mut batch = self.new_batch();
        self.update_list_to(Some(&mut batch), list, changes)?;
        self.run_private(batch).await
    }

    pub fn update_list_batch(
        &mut self,
        list: ObjectId,
        changes: PropertyBag,
    ) -> Result<RequestHandle, BatchError> {
        self.update_list_to(None, list, changes)
    }

    pub fn update_list_in(
        &mut self,
        batch: &mut Batch,
        list: ObjectId,
        changes: PropertyBag,
    ) -> Result<RequestHandle, BatchError> {
        self.update_list_to(Some(batch), list, changes)
    }

    fn update_list_to(
        &mut self,
        batch: Option<&mut Batch>,
        list: ObjectId,
        changes: PropertyBag,
    ) -> Result<RequestHandle, BatchError> {
        self.enqueue_to(batch, RequestSpec::update(list_path(list)?, list, changes))
    }

    /// Deletes a list permanently
    pub async fn delete_list(&mut self, list: ObjectId) -> Result<(), BatchError> {
        let mut batch = self.new_batch();
        self.delete_list_to(Some(&mut batch), list)?;
        self.run_private(batch).await
    }

    pub fn delete_list_batch(&mut self, list: ObjectId) -> Result<RequestHandle, BatchError> {
        self.delete_list_to(None, list)
    }

    pub fn delete_list_in(
        &mut self,
        batch: &mut Batch,
        list: ObjectId,
    ) -> Result<RequestHandle, BatchError> {
        self.delete_list_to(Some(batch), list)
    }

    fn delete_list_to(
        &mut self,
        batch: Option<&mut Batch>,
        list: ObjectId,
    ) -> Result<RequestHandle, BatchError> {
        self.enqueue_to(batch, RequestSpec::delete(list_path(list)?, list))
    }

    /// Moves a list to the recycle bin and returns the recycle bin item id
    pub async fn recycle_list(&mut self, list: ObjectId) -> Result<Uuid, BatchError> {
        let mut batch = self.new_batch();
        let handle = self.recycle_list_to(Some(&mut batch), list)?;
        let result = self.run_private_for(batch, &handle).await?;
        recycle_item_id(&result)
    }

    pub fn recycle_list_batch(&mut self, list: ObjectId) -> Result<RequestHandle, BatchError> {
        self.recycle_list_to(None, list)
    }

    pub fn recycle_list_in(
        &mut self,
        batch: &mut Batch,
        list: ObjectId,
    ) -> Result<RequestHandle, BatchError> {
        self.recycle_list_to(Some(batch), list)
    }

    fn recycle_list_to(
        &mut self,
        batch: Option<&mut Batch>,
        list: ObjectId,
    ) -> Result<RequestHandle, BatchError> {
        self.enqueue_to(
            batch,
            RequestSpec::custom("Recycle", list_path(list)?.join("recycle"), list)
                .with_binding(ResultBinding::Remove),
        )
    }

    /// Recycle bin item id returned by an executed recycle request
    pub fn recycle_bin_item_id(&self, handle: &RequestHandle) -> Result<Uuid, BatchError> {
        recycle_item_id(self.require_result(handle)?)
    }
}

// ============================================================================
// Items
// ============================================================================

impl Context {
    /// Adds an item with the given field values
    pub async fn add_list_item(
        &mut self,
        list: ObjectId,
        values: PropertyBag,
    ) -> Result<ObjectId, BatchError> {
        let mut batch = self.new_batch();
        let item = self.add_list_item_to(Some(&mut batch), list, values)?;
        self.run_private(batch).await?;
        Ok(item)
    }

    pub fn add_list_item_batch(
        &mut self,
        list: ObjectId,
        values: PropertyBag,
    ) -> Result<ObjectId, BatchError> {
        self.add_list_item_to(None, list, values)
    }

    pub fn add_list_item_in(
        &mut self,
        batch: &mut Batch,
        list: ObjectId,
        values: PropertyBag,
    ) -> Result<ObjectId, BatchError> {
        self.add_list_item_to(Some(batch), list, values)
    }

    pub fn add_list_item_blocking(
        &mut self,
        list: ObjectId,
        values: PropertyBag,
    ) -> Result<ObjectId, BatchError> {
        block_on(self.add_list_item(list, values))?
    }

    fn add_list_item_to(
        &mut self,
        batch: Option<&mut Batch>,
        list: ObjectId,
        values: PropertyBag,
    ) -> Result<ObjectId, BatchError> {
        if values.is_empty() {
            return Err(BatchError::invalid("list item values must not be empty"));
        }
        let path = list_path(list)?.join("items");
        self.object(list)?.ensure_live()?;
        let item = self.create_object(EntityKind::ListItem, Some(ParentLink::collection(list, ITEMS)));
        self.enqueue_to(batch, RequestSpec::add(path, item, Payload::Properties(values)))?;
        Ok(item)
    }

    /// Items materialized into a list so far
    pub fn list_items(&self, list: ObjectId) -> Result<Vec<ObjectId>, BatchError> {
        self.members(list, ITEMS)
    }

    /// Runs a CAML query; matching items merge into the list's `Items`
    pub async fn get_items_by_caml_query(
        &mut self,
        list: ObjectId,
        query: impl Into<CamlQueryOptions>,
    ) -> Result<Vec<ObjectId>, BatchError> {
        let mut batch = self.new_batch();
        let handle = self.get_items_by_caml_query_to(Some(&mut batch), list, query.into())?;
        Ok(self.run_private_for(batch, &handle).await?.objects)
    }

    pub fn get_items_by_caml_query_batch(
        &mut self,
        list: ObjectId,
        query: impl Into<CamlQueryOptions>,
    ) -> Result<RequestHandle, BatchError> {
        self.get_items_by_caml_query_to(None, list, query.into())
    }

    pub fn get_items_by_caml_query_in(
        &mut self,
        batch: &mut Batch,
        list: ObjectId,
        query: impl Into<CamlQueryOptions>,
    ) -> Result<RequestHandle, BatchError> {
        self.get_items_by_caml_query_to(Some(batch), list, query.into())
    }

    pub fn get_items_by_caml_query_blocking(
        &mut self,
        list: ObjectId,
        query: impl Into<CamlQueryOptions>,
    ) -> Result<Vec<ObjectId>, BatchError> {
        block_on(self.get_items_by_caml_query(list, query))?
    }

    fn get_items_by_caml_query_to(
        &mut self,
        batch: Option<&mut Batch>,
        list: ObjectId,
        query: CamlQueryOptions,
    ) -> Result<RequestHandle, BatchError> {
        require(&query.view_xml, "view xml")?;
        self.enqueue_to(
            batch,
            RequestSpec::custom("GetItems", list_path(list)?.join("GetItems"), list)
                .with_payload(Payload::Properties(query.to_payload()))
                .with_binding(ResultBinding::Collection(ITEMS.to_string())),
        )
    }

    /// Renders list data; rows merge into `Items` and the paging metadata
    /// (`FirstRow`, `LastRow`, `RowLimit`, ...) is returned
    pub async fn get_list_data_as_stream(
        &mut self,
        list: ObjectId,
        options: RenderListDataOptions,
    ) -> Result<PropertyBag, BatchError> {
        let mut batch = self.new_batch();
        let handle = self.get_list_data_as_stream_to(Some(&mut batch), list, options)?;
        let mut body = self.run_private_for(batch, &handle).await?.body;
        body.remove("Row");
        Ok(body)
    }

    pub fn get_list_data_as_stream_batch(
        &mut self,
        list: ObjectId,
        options: RenderListDataOptions,
    ) -> Result<RequestHandle, BatchError> {
        self.get_list_data_as_stream_to(None, list, options)
    }

    pub fn get_list_data_as_stream_in(
        &mut self,
        batch: &mut Batch,
        list: ObjectId,
        options: RenderListDataOptions,
    ) -> Result<RequestHandle, BatchError> {
        self.get_list_data_as_stream_to(Some(batch), list, options)
    }

    pub fn get_list_data_as_stream_blocking(
        &mut self,
        list: ObjectId,
        options: RenderListDataOptions,
    ) -> Result<PropertyBag, BatchError> {
        block_on(self.get_list_data_as_stream(list, options))?
    }

    fn get_list_data_as_stream_to(
        &mut self,
        batch: Option<&mut Batch>,
        list: ObjectId,
        options: RenderListDataOptions,
    ) -> Result<RequestHandle, BatchError> {
        require(&options.view_xml, "view xml")?;
        self.enqueue_to(
            batch,
            RequestSpec::custom(
                "RenderListDataAsStream",
                list_path(list)?.join("RenderListDataAsStream"),
                list,
            )
            .with_payload(Payload::Properties(options.to_payload()))
            .with_binding(ResultBinding::Rows(ITEMS.to_string())),
        )
    }
}

// ============================================================================
// IRM settings and role inheritance
// ============================================================================

impl Context {
    /// Loads the list's IRM settings into its nested settings object
    pub async fn load_irm_settings(&mut self, list: ObjectId) -> Result<ObjectId, BatchError> {
        let mut batch = self.new_batch();
        let settings = self.load_irm_settings_to(Some(&mut batch), list)?;
        self.run_private(batch).await?;
        Ok(settings)
    }

    pub fn load_irm_settings_batch(&mut self, list: ObjectId) -> Result<ObjectId, BatchError> {
        self.load_irm_settings_to(None, list)
    }

    pub fn load_irm_settings_in(
        &mut self,
        batch: &mut Batch,
        list: ObjectId,
    ) -> Result<ObjectId, BatchError> {
        self.load_irm_settings_to(Some(batch), list)
    }

    fn load_irm_settings_to(
        &mut self,
        batch: Option<&mut Batch>,
        list: ObjectId,
    ) -> Result<ObjectId, BatchError> {
        let path = list_path(list)?.join(IRM_SETTINGS);
        let settings = self.child_object(list, IRM_SETTINGS)?;
        self.enqueue_to(batch, RequestSpec::get(path, settings))?;
        Ok(settings)
    }

    /// Gives the list its own permissions, then refreshes
    /// `HasUniqueRoleAssignments`
    pub async fn break_role_inheritance(
        &mut self,
        list: ObjectId,
        copy_role_assignments: bool,
        clear_subscopes: bool,
    ) -> Result<(), BatchError> {
        let mut batch = self.new_batch();
        self.break_role_inheritance_to(Some(&mut batch), list, copy_role_assignments, clear_subscopes)?;
        self.run_private(batch).await
    }

    pub fn break_role_inheritance_batch(
        &mut self,
        list: ObjectId,
        copy_role_assignments: bool,
        clear_subscopes: bool,
    ) -> Result<RequestHandle, BatchError> {
        self.break_role_inheritance_to(None, list, copy_role_assignments, clear_subscopes)
    }

    pub fn break_role_inheritance_in(
        &mut self,
        batch: &mut Batch,
        list: ObjectId,
        copy_role_assignments: bool,
        clear_subscopes: bool,
    ) -> Result<RequestHandle, BatchError> {
        self.break_role_inheritance_to(Some(batch), list, copy_role_assignments, clear_subscopes)
    }

    fn break_role_inheritance_to(
        &mut self,
        mut batch: Option<&mut Batch>,
        list: ObjectId,
        copy_role_assignments: bool,
        clear_subscopes: bool,
    ) -> Result<RequestHandle, BatchError> {
        let action = format!(
            "breakroleinheritance(copyRoleAssignments={copy_role_assignments},clearSubscopes={clear_subscopes})"
        );
        let handle = self.enqueue_to(
            batch.as_deref_mut(),
            RequestSpec::custom("BreakRoleInheritance", list_path(list)?.join(&action), list),
        )?;
        self.refresh_role_assignments(batch, list)?;
        Ok(handle)
    }

    /// Restores inherited permissions, then refreshes
    /// `HasUniqueRoleAssignments`
    pub async fn reset_role_inheritance(&mut self, list: ObjectId) -> Result<(), BatchError> {
        let mut batch = self.new_batch();
        self.reset_role_inheritance_to(Some(&mut batch), list)?;
        self.run_private(batch).await
    }

    pub fn reset_role_inheritance_batch(&mut self, list: ObjectId) -> Result<RequestHandle, BatchError> {
        self.reset_role_inheritance_to(None, list)
    }

    pub fn reset_role_inheritance_in(
        &mut self,
        batch: &mut Batch,
        list: ObjectId,
    ) -> Result<RequestHandle, BatchError> {
        self.reset_role_inheritance_to(Some(batch), list)
    }

    fn reset_role_inheritance_to(
        &mut self,
        mut batch: Option<&mut Batch>,
        list: ObjectId,
    ) -> Result<RequestHandle, BatchError> {
        let handle = self.enqueue_to(
            batch.as_deref_mut(),
            RequestSpec::custom(
                "ResetRoleInheritance",
                list_path(list)?.join("resetroleinheritance"),
                list,
            ),
        )?;
        self.refresh_role_assignments(batch, list)?;
        Ok(handle)
    }

    fn refresh_role_assignments(
        &mut self,
        batch: Option<&mut Batch>,
        list: ObjectId,
    ) -> Result<RequestHandle, BatchError> {
        let selector = PropertySelector::parse(["HasUniqueRoleAssignments"])?.with_key("Id");
        self.enqueue_to(
            batch,
            RequestSpec::get(list_path(list)?, list).with_selector(selector),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_values() {
        assert_eq!(ListTemplateType::GenericList.value(), 100);
        assert_eq!(ListTemplateType::DocumentLibrary.value(), 101);
        assert_eq!(ListTemplateType::Custom(850).value(), 850);
        assert_eq!("library".parse::<ListTemplateType>().unwrap(), ListTemplateType::DocumentLibrary);
        assert_eq!("171".parse::<ListTemplateType>().unwrap(), ListTemplateType::Custom(171));
        assert!("nope".parse::<ListTemplateType>().is_err());
    }

    #[test]
    fn test_caml_payload() {
        let options = CamlQueryOptions {
            view_xml: "<View/>".into(),
            dates_in_utc: true,
            folder_server_relative_url: Some("/sites/dev/Lists/T/sub".into()),
        };
        let payload = options.to_payload().to_json();
        assert_eq!(payload["query"]["ViewXml"], "<View/>");
        assert_eq!(payload["query"]["DatesInUtc"], true);
        assert_eq!(payload["query"]["FolderServerRelativeUrl"], "/sites/dev/Lists/T/sub");

        let simple: CamlQueryOptions = "<View/>".into();
        assert!(!simple.dates_in_utc);
        assert!(simple.folder_server_relative_url.is_none());
    }

    #[test]
    fn test_render_payload() {
        let options = RenderListDataOptions {
            view_xml: "<View/>".into(),
            render_options: RenderOptions::LIST_DATA | RenderOptions::CONTEXT_INFO,
        };
        let payload = options.to_payload().to_json();
        assert_eq!(payload["parameters"]["RenderOptions"], 3);
    }

    #[test]
    fn test_list_path_is_anchored_on_id() {
        let path = list_path(ObjectId::new(5)).unwrap().join("items");
        assert_eq!(path.anchor().unwrap().key(), "Id");
        assert_eq!(path.resolve("abc"), "_api/web/lists(guid'abc')/items");
    }
}
