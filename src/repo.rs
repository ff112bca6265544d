use async_trait::async_trait;
use chrono::Utc;

use crate::models::*;
use crate::slug;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait PostRepo: Send + Sync {
    /// All posts, newest first.
    async fn list_posts(&self) -> RepoResult<Vec<Post>>;
    async fn get_post(&self, id: Id) -> RepoResult<Post>;
    async fn get_post_by_slug(&self, slug: &str) -> RepoResult<Post>;
    /// Allocates the slug (suffixing on collision; id-derived placeholder
    /// when the title slugifies empty) and stamps both timestamps.
    async fn create_post(&self, new: NewPost) -> RepoResult<Post>;
    /// Recomputes the slug from the new title, replacing the stored one only
    /// when the candidate is free (the post's own slug excluded); otherwise
    /// the old slug is kept silently.
    async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post>;
    /// Returns the deleted record so the caller can clean up files.
    async fn delete_post(&self, id: Id) -> RepoResult<Post>;
    async fn slug_exists(&self, slug: &str, exclude: Option<Id>) -> RepoResult<bool>;
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn get_user(&self, id: Id) -> RepoResult<User>;
    async fn get_user_by_username(&self, username: &str) -> RepoResult<User>;
    async fn get_user_by_email(&self, email: &str) -> RepoResult<User>;
    /// Username and email are each globally unique; violations are `Conflict`.
    async fn create_user(&self, new: NewUser) -> RepoResult<User>;
    async fn update_password(&self, id: Id, password_hash: &str) -> RepoResult<()>;
}

#[async_trait]
pub trait ResetTokenRepo: Send + Sync {
    async fn insert_reset_token(&self, token: ResetToken) -> RepoResult<()>;
    async fn get_reset_token(&self, token: &str) -> RepoResult<ResetToken>;
    /// Idempotent: deleting an absent token succeeds.
    async fn delete_reset_token(&self, token: &str) -> RepoResult<()>;
}

pub trait Repo: PostRepo + UserRepo + ResetTokenRepo {}

impl<T> Repo for T where T: PostRepo + UserRepo + ResetTokenRepo {}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, RwLock};

    const SNAPSHOT_PATH: &str = "data/state.json";

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        posts: HashMap<Id, Post>,
        users: HashMap<Id, User>,
        reset_tokens: HashMap<String, ResetToken>,
        next_id: Id,
    }

    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Arc<PathBuf>,
    }

    impl InMemRepo {
        fn snapshot_path() -> PathBuf {
            match std::env::var("QUILL_DATA_DIR") {
                Ok(dir) => {
                    let mut p = PathBuf::from(dir);
                    p.push("state.json");
                    p
                }
                Err(_) => PathBuf::from(SNAPSHOT_PATH),
            }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        log::info!("loaded snapshot '{}'", path.display());
                        s
                    }
                    Err(e) => {
                        log::warn!("failed to parse snapshot '{}': {e}. Starting empty.", path.display());
                        State::default()
                    }
                },
                Err(_) => State::default(),
            }
        }

        fn persist(&self) {
            let path = self.snapshot_path.clone();
            if let Ok(s) = serde_json::to_vec_pretty(&*self.state.read().unwrap()) {
                if let Some(dir) = path.parent() {
                    let _ = std::fs::create_dir_all(dir);
                }
                if let Err(e) = std::fs::write(&*path, s) {
                    log::error!("failed to write snapshot '{}': {e}", path.display());
                }
            }
        }

        pub fn new() -> Self {
            let snapshot_path = Self::snapshot_path();
            let state = Self::load_state_from(&snapshot_path);
            Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Arc::new(snapshot_path),
            }
        }

        fn next_id(state: &mut State) -> Id {
            state.next_id += 1;
            state.next_id
        }
    }

    impl Default for InMemRepo {
        fn default() -> Self { Self::new() }
    }

    #[async_trait]
    impl PostRepo for InMemRepo {
        async fn list_posts(&self) -> RepoResult<Vec<Post>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s.posts.values().cloned().collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(v)
        }

        async fn get_post(&self, id: Id) -> RepoResult<Post> {
            let s = self.state.read().unwrap();
            s.posts.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn get_post_by_slug(&self, slug: &str) -> RepoResult<Post> {
            let s = self.state.read().unwrap();
            s.posts
                .values()
                .find(|p| p.slug == slug)
                .cloned()
                .ok_or(RepoError::NotFound)
        }

        async fn create_post(&self, new: NewPost) -> RepoResult<Post> {
            let mut s = self.state.write().unwrap();
            let id = Self::next_id(&mut s);
            // Titles that slugify empty fall back to a placeholder derived
            // from the post's own id.
            let title_for_slug = if slug::slugify(&new.title).is_empty() {
                format!("post-{id}")
            } else {
                new.title.clone()
            };
            let post_slug =
                slug::allocate(&title_for_slug, |c| s.posts.values().any(|p| p.slug == c));
            let now = Utc::now();
            let post = Post {
                id,
                title: new.title,
                slug: post_slug,
                content: new.content,
                tags: new.tags,
                hero_banner_url: new.hero_banner_url,
                author_id: new.author_id,
                author_username: new.author_username,
                created_at: now,
                updated_at: now,
            };
            s.posts.insert(id, post.clone());
            drop(s); // release lock before persisting
            self.persist();
            Ok(post)
        }

        async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post> {
            let mut s = self.state.write().unwrap();
            let current_slug = s.posts.get(&id).ok_or(RepoError::NotFound)?.slug.clone();

            // Slug only moves when the title slugifies differently AND the
            // candidate is free (the post's own slug excluded).
            let candidate = slug::slugify(&upd.title);
            let new_slug = if !candidate.is_empty()
                && candidate != current_slug
                && !s.posts.values().any(|p| p.slug == candidate && p.id != id)
            {
                candidate
            } else {
                current_slug
            };

            let post = s.posts.get_mut(&id).ok_or(RepoError::NotFound)?;
            post.title = upd.title;
            post.content = upd.content;
            post.tags = upd.tags;
            post.slug = new_slug;
            if let Some(url) = upd.hero_banner_url {
                post.hero_banner_url = Some(url);
            } else if upd.remove_hero_banner {
                post.hero_banner_url = None;
            }
            post.updated_at = Utc::now();

            let updated = post.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }

        async fn delete_post(&self, id: Id) -> RepoResult<Post> {
            let mut s = self.state.write().unwrap();
            let removed = s.posts.remove(&id).ok_or(RepoError::NotFound)?;
            drop(s);
            self.persist();
            Ok(removed)
        }

        async fn slug_exists(&self, slug: &str, exclude: Option<Id>) -> RepoResult<bool> {
            let s = self.state.read().unwrap();
            Ok(s.posts
                .values()
                .any(|p| p.slug == slug && Some(p.id) != exclude))
        }
    }

    #[async_trait]
    impl UserRepo for InMemRepo {
        async fn get_user(&self, id: Id) -> RepoResult<User> {
            let s = self.state.read().unwrap();
            s.users.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn get_user_by_username(&self, username: &str) -> RepoResult<User> {
            let s = self.state.read().unwrap();
            s.users
                .values()
                .find(|u| u.username == username)
                .cloned()
                .ok_or(RepoError::NotFound)
        }

        async fn get_user_by_email(&self, email: &str) -> RepoResult<User> {
            let s = self.state.read().unwrap();
            s.users
                .values()
                .find(|u| u.email == email)
                .cloned()
                .ok_or(RepoError::NotFound)
        }

        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            let mut s = self.state.write().unwrap();
            if s.users
                .values()
                .any(|u| u.username == new.username || u.email == new.email)
            {
                return Err(RepoError::Conflict);
            }
            let id = Self::next_id(&mut s);
            let user = User {
                id,
                username: new.username,
                email: new.email,
                password_hash: new.password_hash,
                created_at: Utc::now(),
                is_active: true,
            };
            s.users.insert(id, user.clone());
            drop(s);
            self.persist();
            Ok(user)
        }

        async fn update_password(&self, id: Id, password_hash: &str) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            let user = s.users.get_mut(&id).ok_or(RepoError::NotFound)?;
            user.password_hash = password_hash.to_string();
            drop(s);
            self.persist();
            Ok(())
        }
    }

    #[async_trait]
    impl ResetTokenRepo for InMemRepo {
        async fn insert_reset_token(&self, token: ResetToken) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            s.reset_tokens.insert(token.token.clone(), token);
            drop(s);
            self.persist();
            Ok(())
        }

        async fn get_reset_token(&self, token: &str) -> RepoResult<ResetToken> {
            let s = self.state.read().unwrap();
            s.reset_tokens.get(token).cloned().ok_or(RepoError::NotFound)
        }

        async fn delete_reset_token(&self, token: &str) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            s.reset_tokens.remove(token);
            drop(s);
            self.persist();
            Ok(())
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::{Pool, Postgres};

    const POST_COLUMNS: &str = "id, title, slug, content, tags, hero_banner_url, author_id, \
                                author_username, created_at, updated_at";
    const USER_COLUMNS: &str = "id, username, email, password_hash, created_at, is_active";

    fn internal(e: sqlx::Error) -> RepoError {
        RepoError::Internal(e.to_string())
    }

    #[derive(Clone)]
    pub struct PgRepo {
        pool: Pool<Postgres>,
    }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self {
            Self { pool }
        }

        async fn next_post_id(&self) -> RepoResult<Id> {
            let (id,): (Id,) =
                sqlx::query_as("SELECT nextval(pg_get_serial_sequence('posts', 'id'))")
                    .fetch_one(&self.pool)
                    .await
                    .map_err(internal)?;
            Ok(id)
        }
    }

    #[async_trait]
    impl PostRepo for PgRepo {
        async fn list_posts(&self) -> RepoResult<Vec<Post>> {
            let sql = format!("SELECT {POST_COLUMNS} FROM posts ORDER BY created_at DESC");
            sqlx::query_as::<_, Post>(&sql)
                .fetch_all(&self.pool)
                .await
                .map_err(internal)
        }

        async fn get_post(&self, id: Id) -> RepoResult<Post> {
            let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1");
            sqlx::query_as::<_, Post>(&sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(internal)?
                .ok_or(RepoError::NotFound)
        }

        async fn get_post_by_slug(&self, slug: &str) -> RepoResult<Post> {
            let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE slug = $1");
            sqlx::query_as::<_, Post>(&sql)
                .bind(slug)
                .fetch_optional(&self.pool)
                .await
                .map_err(internal)?
                .ok_or(RepoError::NotFound)
        }

        async fn create_post(&self, new: NewPost) -> RepoResult<Post> {
            // Fetch the id up front so the empty-title placeholder can be
            // derived from it before the insert.
            let id = self.next_post_id().await?;
            let base = slug::slugify(&new.title);
            let base = if base.is_empty() { format!("post-{id}") } else { base };
            let mut post_slug = base.clone();
            let mut counter = 1u64;
            while self.slug_exists(&post_slug, None).await? {
                post_slug = format!("{base}-{counter}");
                counter += 1;
            }
            // The unique index on posts.slug backs the check-then-insert
            // above; a concurrent winner surfaces as Conflict.
            let sql = format!(
                "INSERT INTO posts (id, title, slug, content, tags, hero_banner_url, author_id, author_username) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {POST_COLUMNS}"
            );
            sqlx::query_as::<_, Post>(&sql)
                .bind(id)
                .bind(&new.title)
                .bind(&post_slug)
                .bind(&new.content)
                .bind(&new.tags)
                .bind(&new.hero_banner_url)
                .bind(new.author_id)
                .bind(&new.author_username)
                .fetch_one(&self.pool)
                .await
                .map_err(|_| RepoError::Conflict)
        }

        async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post> {
            let current = self.get_post(id).await?;
            let candidate = slug::slugify(&upd.title);
            let new_slug = if !candidate.is_empty()
                && candidate != current.slug
                && !self.slug_exists(&candidate, Some(id)).await?
            {
                candidate
            } else {
                current.slug.clone()
            };
            let hero = if upd.hero_banner_url.is_some() {
                upd.hero_banner_url
            } else if upd.remove_hero_banner {
                None
            } else {
                current.hero_banner_url
            };
            let sql = format!(
                "UPDATE posts SET title = $2, slug = $3, content = $4, tags = $5, \
                 hero_banner_url = $6, updated_at = now() WHERE id = $1 RETURNING {POST_COLUMNS}"
            );
            sqlx::query_as::<_, Post>(&sql)
                .bind(id)
                .bind(&upd.title)
                .bind(&new_slug)
                .bind(&upd.content)
                .bind(&upd.tags)
                .bind(&hero)
                .fetch_optional(&self.pool)
                .await
                .map_err(internal)?
                .ok_or(RepoError::NotFound)
        }

        async fn delete_post(&self, id: Id) -> RepoResult<Post> {
            let sql = format!("DELETE FROM posts WHERE id = $1 RETURNING {POST_COLUMNS}");
            sqlx::query_as::<_, Post>(&sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(internal)?
                .ok_or(RepoError::NotFound)
        }

        async fn slug_exists(&self, slug: &str, exclude: Option<Id>) -> RepoResult<bool> {
            let row: Option<(Id,)> = sqlx::query_as(
                "SELECT id FROM posts WHERE slug = $1 AND ($2::bigint IS NULL OR id <> $2) LIMIT 1",
            )
            .bind(slug)
            .bind(exclude)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?;
            Ok(row.is_some())
        }
    }

    #[async_trait]
    impl UserRepo for PgRepo {
        async fn get_user(&self, id: Id) -> RepoResult<User> {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
            sqlx::query_as::<_, User>(&sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(internal)?
                .ok_or(RepoError::NotFound)
        }

        async fn get_user_by_username(&self, username: &str) -> RepoResult<User> {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
            sqlx::query_as::<_, User>(&sql)
                .bind(username)
                .fetch_optional(&self.pool)
                .await
                .map_err(internal)?
                .ok_or(RepoError::NotFound)
        }

        async fn get_user_by_email(&self, email: &str) -> RepoResult<User> {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
            sqlx::query_as::<_, User>(&sql)
                .bind(email)
                .fetch_optional(&self.pool)
                .await
                .map_err(internal)?
                .ok_or(RepoError::NotFound)
        }

        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            let sql = format!(
                "INSERT INTO users (username, email, password_hash) \
                 VALUES ($1, $2, $3) RETURNING {USER_COLUMNS}"
            );
            sqlx::query_as::<_, User>(&sql)
                .bind(&new.username)
                .bind(&new.email)
                .bind(&new.password_hash)
                .fetch_one(&self.pool)
                .await
                .map_err(|_| RepoError::Conflict)
        }

        async fn update_password(&self, id: Id, password_hash: &str) -> RepoResult<()> {
            let result = sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
                .bind(id)
                .bind(password_hash)
                .execute(&self.pool)
                .await
                .map_err(internal)?;
            if result.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ResetTokenRepo for PgRepo {
        async fn insert_reset_token(&self, token: ResetToken) -> RepoResult<()> {
            sqlx::query(
                "INSERT INTO reset_tokens (token, user_id, created_at, expires_at) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(&token.token)
            .bind(token.user_id)
            .bind(token.created_at)
            .bind(token.expires_at)
            .execute(&self.pool)
            .await
            .map_err(internal)?;
            Ok(())
        }

        async fn get_reset_token(&self, token: &str) -> RepoResult<ResetToken> {
            sqlx::query_as::<_, ResetToken>(
                "SELECT token, user_id, created_at, expires_at FROM reset_tokens WHERE token = $1",
            )
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?
            .ok_or(RepoError::NotFound)
        }

        async fn delete_reset_token(&self, token: &str) -> RepoResult<()> {
            sqlx::query("DELETE FROM reset_tokens WHERE token = $1")
                .bind(token)
                .execute(&self.pool)
                .await
                .map_err(internal)?;
            Ok(())
        }
    }
}
