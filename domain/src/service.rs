use serde_json::Value;

use crate::codec;
use crate::{CoreError, Group, GroupStore, Member, MemberStore};

/// Orchestrates the dual-collection registration workflow.
///
/// Registering a member touches two independently-addressed records: the
/// member's own entry and the denormalized member list on its group. The two
/// writes are deliberately not atomic; see [`RegistrationService::register`]
/// for the accepted intermediate states.
pub struct RegistrationService<M: MemberStore, G: GroupStore> {
    members: M,
    groups: G,
}

impl<M: MemberStore, G: GroupStore> RegistrationService<M, G> {
    pub fn new(members: M, groups: G) -> Self {
        Self { members, groups }
    }

    /// Register a new member from raw JSON fields.
    ///
    /// Workflow:
    /// 1. Decode the payload. A `MissingField` rejection happens before any
    ///    write, so a rejected registration never partially mutates storage.
    /// 2. Unconditionally put the member (overwrite-on-duplicate-name).
    /// 3. Look up the member's group; append the member to an existing
    ///    group's list, or create the group with this member as its first
    ///    entry and its region copied from the member.
    ///
    /// A backend failure after step 2 leaves "member recorded but not yet
    /// attached to its group". That state is never rolled back; callers may
    /// retry the whole registration, which re-appends and can duplicate the
    /// group-side entry. The get-then-branch in step 3 is a check-then-act
    /// race under concurrent first registrations for the same new group
    /// name; the last group put wins.
    pub fn register(&self, raw: &Value) -> Result<Member, CoreError> {
        let member = codec::decode_member(raw)?;

        self.members.put(&member)?;

        match self.groups.get(&member.group)? {
            Some(_) => {
                self.groups
                    .append_members(&member.group, std::slice::from_ref(&member))?;
            }
            None => {
                let group = Group {
                    name: member.group.clone(),
                    region: member.region.clone(),
                    users: vec![member.clone()],
                };
                self.groups.put(&group)?;
            }
        }
        Ok(member)
    }
}

/// Read-only pass-through over the two collections.
pub struct Directory<M: MemberStore, G: GroupStore> {
    members: M,
    groups: G,
}

impl<M: MemberStore, G: GroupStore> Directory<M, G> {
    pub fn new(members: M, groups: G) -> Self {
        Self { members, groups }
    }

    pub fn get_member(&self, name: &str) -> Result<Member, CoreError> {
        self.members.get(name)?.ok_or(CoreError::NotFound)
    }

    pub fn list_members(&self) -> Result<Vec<Member>, CoreError> {
        self.members.scan_all()
    }

    pub fn get_group(&self, name: &str) -> Result<Group, CoreError> {
        self.groups.get(name)?.ok_or(CoreError::NotFound)
    }

    pub fn list_groups(&self) -> Result<Vec<Group>, CoreError> {
        self.groups.scan_all()
    }
}
