//! Message components (buttons and modals) and their custom ids.
//!
//! Discord echoes a component's `custom_id` back in the interaction, so the
//! ids double as the routing key for [`Handler`](crate::handler::Handler).
//! Authorization buttons are `authorization/<request id>/allow|deny`, so a
//! click always names the prompt it was attached to.

use serenity::all::{
  ButtonStyle, CreateActionRow, CreateButton, CreateInputText, CreateModal, InputTextStyle,
};
use uuid::Uuid;

use heaven_core::registration::{MAX_USERNAME_LEN, MIN_USERNAME_LEN};

const AUTHORIZATION_PREFIX: &str = "authorization/";
pub const REGISTER_ID: &str = "register";
pub const CHANGE_NICKNAME_ID: &str = "change-nickname";
pub const UNREGISTER_ID: &str = "unregister";

pub const REGISTRATION_MODAL_ID: &str = "registration";
pub const NICKNAME_MODAL_ID: &str = "nickname-change";
pub const USERNAME_INPUT_ID: &str = "username";

// ─── Parsing ──────────────────────────────────────────────────────────────────

/// What a button click asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonAction {
  Authorize { request_id: Uuid, approved: bool },
  Register,
  ChangeNickname,
  Unregister,
}

/// Which form a modal submission belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModalAction {
  Register,
  ChangeNickname,
}

pub fn parse_button(custom_id: &str) -> Option<ButtonAction> {
  if let Some(rest) = custom_id.strip_prefix(AUTHORIZATION_PREFIX) {
    return parse_authorization(rest);
  }
  match custom_id {
    REGISTER_ID => Some(ButtonAction::Register),
    CHANGE_NICKNAME_ID => Some(ButtonAction::ChangeNickname),
    UNREGISTER_ID => Some(ButtonAction::Unregister),
    _ => None,
  }
}

fn parse_authorization(rest: &str) -> Option<ButtonAction> {
  let (request_id, answer) = rest.split_once('/')?;
  let approved = match answer {
    "allow" => true,
    "deny" => false,
    _ => return None,
  };
  let request_id = Uuid::parse_str(request_id).ok()?;
  Some(ButtonAction::Authorize { request_id, approved })
}

pub fn authorization_id(request_id: Uuid, approved: bool) -> String {
  let answer = if approved { "allow" } else { "deny" };
  format!("{AUTHORIZATION_PREFIX}{request_id}/{answer}")
}

pub fn parse_modal(custom_id: &str) -> Option<ModalAction> {
  match custom_id {
    REGISTRATION_MODAL_ID => Some(ModalAction::Register),
    NICKNAME_MODAL_ID => Some(ModalAction::ChangeNickname),
    _ => None,
  }
}

// ─── Builders ─────────────────────────────────────────────────────────────────

/// Allow / Deny row attached to the confirmation prompt for `request_id`.
pub fn authorization_buttons(request_id: Uuid) -> Vec<CreateActionRow> {
  vec![CreateActionRow::Buttons(vec![
    CreateButton::new(authorization_id(request_id, true)).label("Allow").style(ButtonStyle::Success),
    CreateButton::new(authorization_id(request_id, false)).label("Deny").style(ButtonStyle::Danger),
  ])]
}

/// Buttons on the persistent whitelist message.
pub fn whitelist_buttons() -> Vec<CreateActionRow> {
  vec![CreateActionRow::Buttons(vec![
    CreateButton::new(REGISTER_ID).label("Register").style(ButtonStyle::Primary),
    CreateButton::new(CHANGE_NICKNAME_ID).label("Change nickname").style(ButtonStyle::Secondary),
    CreateButton::new(UNREGISTER_ID).label("Unregister").style(ButtonStyle::Danger),
  ])]
}

/// Single-field form asking for a game-server username.
pub fn username_modal(action: ModalAction) -> CreateModal {
  let (id, title, label) = match action {
    ModalAction::Register => (REGISTRATION_MODAL_ID, "Registration", "Your nickname on the server"),
    ModalAction::ChangeNickname => (NICKNAME_MODAL_ID, "Change nickname", "Your new nickname"),
  };
  let input = CreateInputText::new(InputTextStyle::Short, label, USERNAME_INPUT_ID)
    .min_length(MIN_USERNAME_LEN as u16)
    .max_length(MAX_USERNAME_LEN as u16)
    .required(true);
  CreateModal::new(id, title).components(vec![CreateActionRow::InputText(input)])
}
