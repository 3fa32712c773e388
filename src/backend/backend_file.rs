use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::PathBuf;

use log::{error, info};
use tokio::sync::RwLock;

use crate::auth::SessionId;
use crate::backend::{AddError, FindError};
use crate::user::User;

mod kv;
use kv::KeyValues;

use super::session::SessionStorage;

pub const USERS_KEY: &str = "ai_imager_users";
pub const CURRENT_USER_KEY: &str = "ai_imager_current_user";

const LOCAL_STORAGE: &str = "local_storage.txt";

pub struct Backend {
    root: PathBuf,
    // readers of the local storage file share, read-modify-write is exclusive
    lock: RwLock<()>,
    sessions: SessionStorage,
}

pub async fn init(data_dir: &PathBuf) -> std::io::Result<()> {
    fs::create_dir_all(data_dir)?;
    info!("using data directory {data_dir:?}");
    Ok(())
}

impl Backend {
    pub async fn new(path: &PathBuf) -> Self {
        Self {
            root: path.to_path_buf(),
            lock: RwLock::new(()),
            sessions: SessionStorage::default(),
        }
    }
}

macro_rules! path {
    ($root: expr, $($components: expr),*) => {
        {
            let mut p = $root.clone();
            $(p.push($components);)*
            p
        }
    };
}

// local storage
impl Backend {
    fn read(&self) -> Result<KeyValues, FindError> {
        let path = path!(self.root, LOCAL_STORAGE);
        let file = File::open(&path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                return FindError::NotFound;
            }
            error!("open \"{path:?}\": {e:?}");
            FindError::Internal
        })?;

        kv::read(file)
    }

    fn read_or_empty(&self) -> Result<KeyValues, ()> {
        match self.read() {
            Ok(kv) => Ok(kv),
            Err(FindError::NotFound) => Ok(KeyValues::new()),
            Err(FindError::Internal) => Err(()),
        }
    }

    // written beside the real file then renamed over it, so a reader never
    // sees a half written file
    fn write(&self, keyvalues: &KeyValues) -> Result<(), ()> {
        let path = path!(self.root, LOCAL_STORAGE);
        let tmp = path!(self.root, format!("{LOCAL_STORAGE}.tmp"));

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp)
            .map_err(|e| {
                error!("couldn't open \"{tmp:?}\": {e:?}");
            })?;

        kv::write(&file, keyvalues)
            .and_then(|()| file.sync_all())
            .map_err(|e| {
                error!("writing \"{tmp:?}\": {e:?}");
            })?;

        fs::rename(&tmp, &path).map_err(|e| {
            error!("couldn't replace \"{path:?}\": {e:?}");
        })
    }

    // caller holds `lock`
    fn get_item_locked(&self, key: &str) -> Result<Option<String>, ()> {
        Ok(self.read_or_empty()?.remove(key))
    }

    // caller holds `lock` for writing
    fn set_item_locked(&self, key: &str, value: &str) -> Result<(), ()> {
        let mut kv = self.read_or_empty()?;
        kv.insert(key.into(), value.into());
        self.write(&kv)
    }
}

// users
impl Backend {
    // caller holds `lock`
    fn users_locked(&self) -> Result<Vec<User>, ()> {
        let Some(json) = self.get_item_locked(USERS_KEY)? else {
            return Ok(vec![]);
        };

        serde_json::from_str(&json).map_err(|e| {
            error!("couldn't parse stored users: {e:?}");
        })
    }

    /// Appends `user`, unless one with the same email already exists.
    pub async fn add_user(&self, user: User) -> Result<User, AddError> {
        let _guard = self.lock.write().await;

        let mut users = self.users_locked().map_err(|()| AddError::Internal)?;
        if users.iter().any(|u| u.email == user.email) {
            return Err(AddError::Exists);
        }

        users.push(user.clone());

        let json = serde_json::to_string(&users).map_err(|e| {
            error!("couldn't convert users to json: {e:?}");
            AddError::Internal
        })?;
        self.set_item_locked(USERS_KEY, &json)
            .map_err(|()| AddError::Internal)?;

        Ok(user)
    }

    pub async fn find_user(&self, email: &str, password: &str) -> Result<User, FindError> {
        let _guard = self.lock.read().await;

        self.users_locked()
            .map_err(|()| FindError::Internal)?
            .into_iter()
            .find(|u| u.email == email && u.password_hash == password)
            .ok_or(FindError::NotFound)
    }
}

// session storage
impl Backend {
    pub async fn current_user(&self, session_id: &SessionId) -> Result<Option<User>, ()> {
        let Some(json) = self.sessions.get_item(session_id, CURRENT_USER_KEY) else {
            return Ok(None);
        };

        serde_json::from_str(&json).map(Some).map_err(|e| {
            error!("couldn't parse current user for session {session_id}: {e:?}");
        })
    }

    /// Makes `user` current for `session_id`. A user holds one session at a
    /// time, so any earlier session of theirs is dropped.
    pub async fn set_current_user(&self, session_id: &SessionId, user: &User) -> Result<(), ()> {
        let json = serde_json::to_string(user).map_err(|e| {
            error!("couldn't convert user to json: {e:?}");
        })?;

        self.sessions.set_item(session_id, CURRENT_USER_KEY, json);
        self.sessions
            .remove_others(session_id, CURRENT_USER_KEY, |other| {
                serde_json::from_str::<User>(other).is_ok_and(|u| u.id == user.id)
            });
        Ok(())
    }

    /// Returns whether the session had a current user.
    pub async fn clear_current_user(&self, session_id: &SessionId) -> bool {
        self.sessions.remove_item(session_id, CURRENT_USER_KEY)
    }
}
