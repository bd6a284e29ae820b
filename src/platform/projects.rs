//! Project boards over the GraphQL API.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::GithubClient;
use crate::error::{PairError, PairResult};
use crate::mailbox::{BoardFactory, ProjectBoard};

const OWNER_PROJECTS: &str = r#"
query($login: String!) {
  user(login: $login) {
    id
    projectsV2(first: 100) { nodes { id number title } }
  }
}"#;

const CREATE_PROJECT: &str = r#"
mutation($owner: ID!, $title: String!) {
  createProjectV2(input: {ownerId: $owner, title: $title}) {
    projectV2 { id number title }
  }
}"#;

const PROJECT_ITEMS: &str = r#"
query($project: ID!) {
  node(id: $project) {
    ... on ProjectV2 { items(first: 100) { nodes { id } } }
  }
}"#;

const DELETE_ITEM: &str = r#"
mutation($project: ID!, $item: ID!) {
  deleteProjectV2Item(input: {projectId: $project, itemId: $item}) { deletedItemId }
}"#;

const ADD_DRAFT: &str = r#"
mutation($project: ID!, $title: String!, $body: String!) {
  addProjectV2DraftIssue(input: {projectId: $project, title: $title, body: $body}) {
    projectItem { id }
  }
}"#;

const DELETE_PROJECT: &str = r#"
mutation($project: ID!) {
  deleteProjectV2(input: {projectId: $project}) { projectV2 { id } }
}"#;

#[derive(Debug, Clone, Deserialize)]
struct ProjectNode {
    id: String,
    number: u64,
    title: String,
}

#[derive(Deserialize)]
struct Nodes<T> {
    nodes: Vec<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OwnerUser {
    id: String,
    projects_v2: Nodes<ProjectNode>,
}

#[derive(Deserialize)]
struct OwnerData {
    user: Option<OwnerUser>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Created {
    project_v2: ProjectNode,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateData {
    create_project_v2: Created,
}

#[derive(Deserialize)]
struct ItemId {
    id: String,
}

#[derive(Deserialize)]
struct ProjectItems {
    items: Nodes<ItemId>,
}

#[derive(Deserialize)]
struct ItemsData {
    node: Option<ProjectItems>,
}

/// Public URL of a user project.
pub fn project_url(owner: &str, number: u64) -> String {
    format!("https://github.com/users/{owner}/projects/{number}")
}

/// Opens boards owned by one user.
#[derive(Debug, Clone)]
pub struct GithubProjects {
    client: GithubClient,
    owner: String,
}

impl GithubProjects {
    pub fn new(client: GithubClient, owner: &str) -> Self {
        Self {
            client,
            owner: owner.to_string(),
        }
    }
}

#[async_trait]
impl BoardFactory for GithubProjects {
    async fn open(&self, title: &str) -> PairResult<Box<dyn ProjectBoard>> {
        let data: OwnerData = self
            .client
            .graphql(OWNER_PROJECTS, json!({ "login": self.owner }))
            .await?;
        let user = data
            .user
            .ok_or_else(|| PairError::configuration(format!("unknown owner {}", self.owner)))?;

        let existing = user.projects_v2.nodes.into_iter().find(|p| p.title == title);
        let project = match existing {
            Some(project) => {
                debug!(title, number = project.number, "Reusing project");
                project
            }
            None => {
                let created: CreateData = self
                    .client
                    .graphql(CREATE_PROJECT, json!({ "owner": user.id, "title": title }))
                    .await?;
                info!(title, number = created.create_project_v2.project_v2.number, "Created project");
                created.create_project_v2.project_v2
            }
        };

        Ok(Box::new(GithubBoard {
            client: self.client.clone(),
            url: project_url(&self.owner, project.number),
            project,
        }))
    }
}

struct GithubBoard {
    client: GithubClient,
    project: ProjectNode,
    url: String,
}

#[async_trait]
impl ProjectBoard for GithubBoard {
    async fn clear(&self) -> PairResult<()> {
        let data: ItemsData = self
            .client
            .graphql(PROJECT_ITEMS, json!({ "project": self.project.id }))
            .await?;
        let items = data.node.map(|n| n.items.nodes).unwrap_or_default();
        for item in &items {
            let _: serde_json::Value = self
                .client
                .graphql(DELETE_ITEM, json!({ "project": self.project.id, "item": item.id }))
                .await?;
        }
        debug!(title = %self.project.title, removed = items.len(), "Cleared project");
        Ok(())
    }

    async fn add_item(&self, title: &str, body: &str) -> PairResult<()> {
        let _: serde_json::Value = self
            .client
            .graphql(
                ADD_DRAFT,
                json!({ "project": self.project.id, "title": title, "body": body }),
            )
            .await?;
        Ok(())
    }

    async fn finish(&self) -> PairResult<()> {
        let _: serde_json::Value = self
            .client
            .graphql(DELETE_PROJECT, json!({ "project": self.project.id }))
            .await?;
        info!(title = %self.project.title, "Deleted project");
        Ok(())
    }

    fn url(&self) -> &str {
        &self.url
    }
}
