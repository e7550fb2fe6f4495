use minidom::Element;
use xmpp_parsers::ns;

pub const STREAM_NS: &str = "http://etherx.jabber.org/streams";

/// Where an inbound stanza goes. Decided purely from the element, never from
/// session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Message,
    Presence,
    IncomingRequest,
    Response,
    MechanismsOffered,
    Ignored,
}

pub fn classify(stanza: &Element) -> Route {
    match stanza.name() {
        "message" => Route::Message,
        "presence" => Route::Presence,
        "iq" => match stanza.attr("type") {
            Some("get") | Some("set") => Route::IncomingRequest,
            _ => Route::Response,
        },
        "features" if stanza.is("features", STREAM_NS) => {
            if stanza.has_child("mechanisms", ns::SASL) {
                Route::MechanismsOffered
            } else {
                Route::Ignored
            }
        }
        _ => Route::Ignored,
    }
}
