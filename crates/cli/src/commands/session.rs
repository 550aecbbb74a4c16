use fetchkit::{Client, Credentials};
use serde_json::{Value, json};

use crate::cli::LoginArgs;
use crate::error::{CliError, Result};
use crate::output::{StatusData, UserData};

pub async fn login(client: &Client, args: &LoginArgs) -> Result<UserData> {
	let user = client
		.session()
		.login(&Credentials::new(args.email.clone(), args.password.clone()))
		.await?;
	Ok(UserData { user })
}

/// Always succeeds locally; a failed server call is only logged.
pub async fn logout(client: &Client) -> Value {
	let was_authenticated = client.session().is_authenticated();
	client.session().logout().await;
	json!({ "loggedOut": was_authenticated })
}

pub async fn whoami(client: &Client) -> Result<UserData> {
	if !client.session().is_authenticated() {
		return Err(CliError::NotLoggedIn);
	}
	let user = client.session().fetch_current_user().await?;
	Ok(UserData { user })
}

pub fn status(client: &Client) -> StatusData {
	let session = client.session();
	StatusData {
		session: (*session.state()).clone(),
		queued: session.offline_actions().len(),
	}
}
