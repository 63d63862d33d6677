// ── Hub record → domain conversions ──
//
// Raw records from hassmodel-api become immutable domain types here.
// Empty id strings are treated as absent, since the hub sends `""` and
// `null` interchangeably for unset references.

use hassmodel_api::{HassArea, HassContext, HassDevice, HassEntity, HassState};

use crate::model::{Area, Attributes, Context, Device, EntityRegistration, EntityState};

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

impl From<HassContext> for Context {
    fn from(ctx: HassContext) -> Self {
        Self {
            id: ctx.id,
            user_id: ctx.user_id,
            parent_id: ctx.parent_id,
        }
    }
}

impl From<HassState> for EntityState {
    fn from(raw: HassState) -> Self {
        Self {
            entity_id: raw.entity_id,
            state: raw.state,
            attributes: Attributes::from_value(raw.attributes),
            last_changed: raw.last_changed,
            last_updated: raw.last_updated,
            context: raw.context.map(Context::from),
        }
    }
}

impl From<HassArea> for Area {
    fn from(raw: HassArea) -> Self {
        Self {
            id: raw.id,
            name: raw.name,
            floor_id: non_empty(raw.floor_id),
            labels: raw.labels,
        }
    }
}

impl From<HassDevice> for Device {
    fn from(raw: HassDevice) -> Self {
        Self {
            id: raw.id,
            name: non_empty(raw.name),
            area_id: non_empty(raw.area_id),
            labels: raw.labels,
        }
    }
}

impl From<HassEntity> for EntityRegistration {
    fn from(raw: HassEntity) -> Self {
        Self {
            entity_id: raw.entity_id,
            name: non_empty(raw.name),
            device_id: non_empty(raw.device_id),
            area_id: non_empty(raw.area_id),
            labels: raw.labels,
        }
    }
}
