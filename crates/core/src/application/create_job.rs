// Atomic creation of a coding job: units, jobsets and memberships land in
// one transaction or not at all. Conditionals are checked against the
// codebook here so no coder can ever get stuck on an unsatisfiable check.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::domain::{
    codebook, CodingJob, Conditional, JobSet, JobSetUnit, JobUser, Position, Rules, Unit, UnitType,
    User,
};
use crate::domain::DomainError;
use crate::error::{AppError, Result};
use crate::port::{StoreTransaction, TimeProvider, TransactionalStore};

/// Upload payload for one unit.
#[derive(Debug, Clone, Deserialize)]
pub struct UnitDraft {
    pub id: String,
    pub unit: Value,
    #[serde(rename = "type", default)]
    pub unit_type: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub conditionals: Option<Vec<Conditional>>,
    #[serde(default)]
    pub gold: Option<Value>,
}

/// Upload payload for one jobset. Absent id lists select all units with the
/// matching position.
#[derive(Debug, Clone, Deserialize)]
pub struct JobSetDraft {
    pub name: String,
    #[serde(default)]
    pub codebook: Option<Value>,
    #[serde(default)]
    pub rules: Option<Rules>,
    #[serde(default)]
    pub ids: Option<Vec<String>>,
    #[serde(default)]
    pub pre_ids: Option<Vec<String>>,
    #[serde(default)]
    pub post_ids: Option<Vec<String>>,
    #[serde(default)]
    pub debriefing: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Authorization {
    #[serde(default)]
    pub restricted: bool,
    #[serde(default)]
    pub users: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateJobRequest {
    pub title: String,
    #[serde(default)]
    pub codebook: Option<Value>,
    pub units: Vec<UnitDraft>,
    pub rules: Rules,
    #[serde(default)]
    pub jobsets: Option<Vec<JobSetDraft>>,
    #[serde(default)]
    pub authorization: Option<Authorization>,
    #[serde(default)]
    pub debriefing: Option<Value>,
}

/// Create a coding job. Admin only. Fails atomically: any validation error
/// rolls the whole upload back.
pub async fn create_job(
    store: &dyn TransactionalStore,
    time: &dyn TimeProvider,
    creator: &User,
    request: CreateJobRequest,
) -> Result<i64> {
    if !creator.is_admin {
        return Err(AppError::AuthorizationDenied(
            "only admins can create coding jobs".to_string(),
        ));
    }
    if request.title.trim().is_empty() || request.units.is_empty() {
        return Err(AppError::BadRequest(
            "coding job needs a title and at least one unit".to_string(),
        ));
    }

    let jobset_drafts = match request.jobsets {
        Some(drafts) if !drafts.is_empty() => drafts,
        _ => vec![JobSetDraft {
            name: "All".to_string(),
            codebook: None,
            rules: None,
            ids: None,
            pre_ids: None,
            post_ids: None,
            debriefing: None,
        }],
    };

    let names: HashSet<&str> = jobset_drafts.iter().map(|d| d.name.as_str()).collect();
    if names.len() < jobset_drafts.len() {
        return Err(AppError::BadRequest(
            "jobsets must have unique names".to_string(),
        ));
    }
    for draft in &jobset_drafts {
        if draft.codebook.is_none() && request.codebook.is_none() {
            return Err(AppError::BadRequest(
                "either a codebook needs to be given, or all jobsets must have a codebook"
                    .to_string(),
            ));
        }
    }

    let authorization = request.authorization.unwrap_or_default();

    let mut tx = store.begin().await?;

    let job = CodingJob {
        id: 0,
        title: request.title,
        creator_id: creator.id,
        restricted: authorization.restricted,
        archived: false,
        created: time.now_millis(),
    };
    let job_id = tx.insert_job(&job).await?;

    let units = insert_units(&mut *tx, job_id, &request.units).await?;

    for draft in jobset_drafts {
        let codebook = draft
            .codebook
            .or_else(|| request.codebook.clone())
            .ok_or_else(|| AppError::BadRequest("jobset without codebook".to_string()))?;
        let rules = draft.rules.unwrap_or_else(|| request.rules.clone());
        let debriefing = draft.debriefing.or_else(|| request.debriefing.clone());

        let jobset = JobSet {
            id: 0,
            codingjob_id: job_id,
            name: draft.name,
            codebook,
            rules,
            debriefing,
        };
        let jobset_id = tx.insert_jobset(&jobset).await?;

        add_members(
            &mut *tx,
            jobset_id,
            &jobset.codebook,
            &units,
            Some(Position::Pre),
            draft.pre_ids.as_deref(),
        )
        .await?;
        add_members(
            &mut *tx,
            jobset_id,
            &jobset.codebook,
            &units,
            None,
            draft.ids.as_deref(),
        )
        .await?;
        add_members(
            &mut *tx,
            jobset_id,
            &jobset.codebook,
            &units,
            Some(Position::Post),
            draft.post_ids.as_deref(),
        )
        .await?;
    }

    set_job_coders(&mut *tx, job_id, &authorization.users).await?;

    tx.commit().await?;

    info!(job_id, units = units.len(), "coding job created");
    Ok(job_id)
}

async fn insert_units(
    tx: &mut dyn StoreTransaction,
    job_id: i64,
    drafts: &[UnitDraft],
) -> Result<Vec<Unit>> {
    let mut units = Vec::with_capacity(drafts.len());
    for draft in drafts {
        let unit_type: UnitType = match draft.unit_type.as_deref() {
            Some(raw) => raw.parse().map_err(AppError::Domain)?,
            None => UnitType::Code,
        };
        let position: Option<Position> = draft
            .position
            .as_deref()
            .map(str::parse)
            .transpose()
            .map_err(AppError::Domain)?;

        let mut unit = Unit {
            id: 0,
            codingjob_id: job_id,
            external_id: draft.id.clone(),
            content: draft.unit.clone(),
            conditionals: draft.conditionals.clone(),
            unit_type,
            position,
            gold: draft.gold.clone(),
        };
        unit.id = tx.insert_unit(&unit).await?;
        units.push(unit);
    }
    Ok(units)
}

/// Add one positional slice of a jobset's members. Pre units get ascending
/// fixed indices, post units negative ones counted from the end.
async fn add_members(
    tx: &mut dyn StoreTransaction,
    jobset_id: i64,
    codebook: &Value,
    units: &[Unit],
    position: Option<Position>,
    id_override: Option<&[String]>,
) -> Result<()> {
    let by_external: HashMap<&str, &Unit> =
        units.iter().map(|u| (u.external_id.as_str(), u)).collect();

    let selected: Vec<&Unit> = match id_override {
        Some(ids) => {
            let mut selected = Vec::with_capacity(ids.len());
            for id in ids {
                let unit = by_external.get(id.as_str()).ok_or_else(|| {
                    AppError::BadRequest(format!("jobset references unknown unit id '{id}'"))
                })?;
                selected.push(*unit);
            }
            selected
        }
        None => units.iter().filter(|u| u.position == position).collect(),
    };

    let n = selected.len() as i64;
    for (i, unit) in selected.iter().enumerate() {
        let invalid = codebook::invalid_conditionals(unit, codebook);
        if !invalid.is_empty() {
            return Err(AppError::Domain(DomainError::ImpossibleConditionals {
                external_id: unit.external_id.clone(),
                variables: invalid.join(", "),
            }));
        }

        let fixed_index = match position {
            Some(Position::Pre) => Some(i as i64),
            Some(Position::Post) => Some(i as i64 - n),
            None => None,
        };
        let member = JobSetUnit {
            id: 0,
            jobset_id,
            unit_id: unit.id,
            fixed_index,
            has_conditionals: unit.conditionals.is_some(),
            blocked: false,
        };
        tx.insert_jobset_unit(&member).await?;
    }
    Ok(())
}

/// Invite the listed users (by email), provisioning accounts that do not
/// exist yet. Relevant when the job is restricted.
async fn set_job_coders(
    tx: &mut dyn StoreTransaction,
    job_id: i64,
    identifiers: &[String],
) -> Result<()> {
    for identifier in identifiers {
        let user_id = match tx.user_by_email(identifier).await? {
            Some(user) => user.id,
            None => {
                let user = User {
                    id: 0,
                    name: identifier.clone(),
                    email: Some(identifier.clone()),
                    is_admin: false,
                    restricted_job: None,
                    password: None,
                };
                tx.insert_user(&user).await?
            }
        };
        match tx.job_user(user_id, job_id).await? {
            Some(job_user) => tx.set_job_user_can_code(job_user.id, true).await?,
            None => {
                let job_user = JobUser::new(user_id, job_id, None);
                tx.insert_job_user(&job_user).await?;
            }
        }
    }
    Ok(())
}
