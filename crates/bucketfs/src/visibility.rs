//! Visibility <-> ACL conversion

use std::fmt::Debug;

use bucketfs_core::Visibility;

use crate::client::Grant;

/// Canned ACL granting read access to everyone
pub const PUBLIC_READ_ACL: &str = "public-read";

/// Canned ACL restricting access to the owner
pub const PRIVATE_ACL: &str = "private";

/// All-users group URI used by Amazon S3
pub const S3_ALL_USERS_URI: &str = "http://acs.amazonaws.com/groups/global/AllUsers";

/// All-users group URI used by Tencent COS
pub const COS_ALL_USERS_URI: &str = "http://cam.qcloud.com/groups/global/AllUsers";

/// Maps the two-valued visibility onto a service's access control
///
/// Implementations must be total and free of side effects.
pub trait VisibilityConverter: Send + Sync + Debug {
    /// Canned ACL token to apply for `visibility`
    fn visibility_to_acl(&self, visibility: Visibility) -> &'static str;

    /// Visibility implied by an object's grant list
    fn acl_to_visibility(&self, grants: &[Grant]) -> Visibility;

    /// Visibility given to directory markers
    fn default_for_directories(&self) -> Visibility;
}

/// Converter understanding the canned ACLs shared by S3-compatible services
#[derive(Debug, Clone)]
pub struct PortableVisibilityConverter {
    all_users_uris: Vec<String>,
    default_for_directories: Visibility,
}

impl Default for PortableVisibilityConverter {
    fn default() -> Self {
        Self::new(Visibility::Public)
    }
}

impl PortableVisibilityConverter {
    pub fn new(default_for_directories: Visibility) -> Self {
        Self {
            all_users_uris: vec![S3_ALL_USERS_URI.to_string(), COS_ALL_USERS_URI.to_string()],
            default_for_directories,
        }
    }

    /// Recognize an additional all-users group URI (for other S3-compatible services)
    pub fn with_all_users_uri(mut self, uri: impl Into<String>) -> Self {
        self.all_users_uris.push(uri.into());
        self
    }

    fn is_all_users(&self, uri: Option<&str>) -> bool {
        uri.is_some_and(|uri| self.all_users_uris.iter().any(|known| known == uri))
    }
}

impl VisibilityConverter for PortableVisibilityConverter {
    fn visibility_to_acl(&self, visibility: Visibility) -> &'static str {
        match visibility {
            Visibility::Public => PUBLIC_READ_ACL,
            Visibility::Private => PRIVATE_ACL,
        }
    }

    fn acl_to_visibility(&self, grants: &[Grant]) -> Visibility {
        let public = grants.iter().any(|grant| {
            self.is_all_users(grant.grantee.uri.as_deref()) && grant.permission.allows_read()
        });

        if public {
            Visibility::Public
        } else {
            Visibility::Private
        }
    }

    fn default_for_directories(&self) -> Visibility {
        self.default_for_directories
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Grantee, Permission};

    fn owner_grant() -> Grant {
        Grant {
            grantee: Grantee::user("owner-id"),
            permission: Permission::FullControl,
        }
    }

    #[test]
    fn test_visibility_to_acl() {
        let converter = PortableVisibilityConverter::default();
        assert_eq!(converter.visibility_to_acl(Visibility::Public), "public-read");
        assert_eq!(converter.visibility_to_acl(Visibility::Private), "private");
    }

    #[test]
    fn test_all_users_read_is_public() {
        let converter = PortableVisibilityConverter::default();
        for uri in [S3_ALL_USERS_URI, COS_ALL_USERS_URI] {
            let grants = vec![
                owner_grant(),
                Grant {
                    grantee: Grantee::group(uri),
                    permission: Permission::Read,
                },
            ];
            assert_eq!(converter.acl_to_visibility(&grants), Visibility::Public);
        }
    }

    #[test]
    fn test_other_grants_are_private() {
        let converter = PortableVisibilityConverter::default();

        assert_eq!(converter.acl_to_visibility(&[]), Visibility::Private);
        assert_eq!(converter.acl_to_visibility(&[owner_grant()]), Visibility::Private);

        // all users, but not read-capable
        let grants = vec![Grant {
            grantee: Grantee::group(S3_ALL_USERS_URI),
            permission: Permission::WriteAcp,
        }];
        assert_eq!(converter.acl_to_visibility(&grants), Visibility::Private);

        // read-capable, but some other group
        let grants = vec![Grant {
            grantee: Grantee::group("http://acs.amazonaws.com/groups/global/AuthenticatedUsers"),
            permission: Permission::Read,
        }];
        assert_eq!(converter.acl_to_visibility(&grants), Visibility::Private);
    }

    #[test]
    fn test_custom_all_users_uri() {
        let converter = PortableVisibilityConverter::new(Visibility::Private)
            .with_all_users_uri("urn:example:everyone");
        let grants = vec![Grant {
            grantee: Grantee::group("urn:example:everyone"),
            permission: Permission::Read,
        }];
        assert_eq!(converter.acl_to_visibility(&grants), Visibility::Public);
        assert_eq!(converter.default_for_directories(), Visibility::Private);
    }
}
